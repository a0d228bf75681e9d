use url::Url;

/// The canonical form of a page URL: query string and fragment removed
///
/// This is what scripts see as `homepage_url`.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use scene_scraper::url::canonical_url;
///
/// let url = Url::parse("https://example.com/scene/12?ref=list#top").unwrap();
/// assert_eq!(canonical_url(&url), "https://example.com/scene/12");
/// ```
pub fn canonical_url(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_query(None);
    canonical.set_fragment(None);
    canonical.to_string()
}

/// Resolves an attribute value against the page it was found on
///
/// Returns `None` for empty values, fragment-only links, non-HTTP schemes
/// and anything that does not parse. The fragment of the result is dropped.
pub fn resolve_url(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}

/// Returns the first configured substring contained in `url`, if any
pub fn find_skip_match<'a>(url: &str, skip_substrings: &'a [String]) -> Option<&'a str> {
    skip_substrings
        .iter()
        .filter(|s| !s.is_empty())
        .find(|s| url.contains(s.as_str()))
        .map(String::as_str)
}
