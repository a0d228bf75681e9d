/// Checks if a host matches an allowed-domain pattern
///
/// Plain patterns match only the identical host. `*.example.com` matches
/// `example.com` itself and any subdomain of it.
///
/// # Examples
///
/// ```
/// use scene_scraper::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "www.example.com"));
/// assert!(matches_wildcard("*.example.com", "cdn.example.com"));
/// assert!(!matches_wildcard("*.example.com", "notexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}
