use url::Url;

/// Extracts the lowercase host of a URL
///
/// Returns `None` for URLs without a host (`data:`, `mailto:` and the like).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use scene_scraper::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.com:8080/scene/1").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
