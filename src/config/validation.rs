use crate::config::types::{
    CrawlerSettings, DetailStage, ExtractionDirective, LinkStage, ScraperDefinition,
    SecondaryStage,
};
use crate::crawler::parse_selector;
use crate::url::AllowedDomains;
use crate::ConfigError;
use url::Url;

/// Validates the entire definition
pub fn validate(definition: &ScraperDefinition) -> Result<(), ConfigError> {
    validate_identity(definition)?;
    validate_domains(definition)?;

    if let Some(listing) = definition.listing() {
        validate_link_stage("listing", listing)?;
    }

    match (definition.listing(), definition.pagination()) {
        (None, Some(_)) => {
            return Err(ConfigError::Validation(
                "pagination requires a listing stage".to_string(),
            ));
        }
        (_, Some(pagination)) => validate_link_stage("pagination", pagination)?,
        _ => {}
    }

    validate_detail_stage(&definition.detail)?;

    if let Some(secondary) = definition.secondary_detail() {
        validate_secondary_stage(secondary)?;
    }

    Ok(())
}

/// Validates the runtime settings
pub fn validate_settings(settings: &CrawlerSettings) -> Result<(), ConfigError> {
    if settings.max_concurrent_requests < 1 || settings.max_concurrent_requests > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 64, got {}",
            settings.max_concurrent_requests
        )));
    }

    if settings.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if settings.output_buffer < 1 {
        return Err(ConfigError::Validation(
            "output_buffer must be >= 1".to_string(),
        ));
    }

    if settings.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if settings.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "cache_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_identity(definition: &ScraperDefinition) -> Result<(), ConfigError> {
    if definition.scraper_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "scraper_id cannot be empty".to_string(),
        ));
    }

    if definition.site_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "site_id cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_domains(definition: &ScraperDefinition) -> Result<(), ConfigError> {
    if definition.allowed_domains.is_empty() {
        return Err(ConfigError::Validation(
            "allowed_domains must list at least one domain".to_string(),
        ));
    }

    for domain in &definition.allowed_domains {
        validate_domain_pattern(domain)?;
    }

    let start = Url::parse(&definition.start_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid start_url '{}': {}",
            definition.start_url, e
        ))
    })?;

    if start.scheme() != "http" && start.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "start_url '{}' must use http or https",
            definition.start_url
        )));
    }

    if !AllowedDomains::new(&definition.allowed_domains).allows(&start) {
        return Err(ConfigError::Validation(format!(
            "start_url '{}' is not within allowed_domains",
            definition.start_url
        )));
    }

    Ok(())
}

/// Validates a domain pattern: "example.com" or "*.example.com"
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.trim().is_empty() {
        return Err(ConfigError::Validation(
            "allowed domain cannot be empty".to_string(),
        ));
    }

    if pattern.contains("://") || pattern.contains('/') {
        return Err(ConfigError::Validation(format!(
            "allowed domain '{}' must be a bare host name",
            pattern
        )));
    }

    let base = pattern.strip_prefix("*.").unwrap_or(pattern);
    if base.contains('*') {
        return Err(ConfigError::Validation(format!(
            "wildcard is only allowed as a leading '*.' in '{}'",
            pattern
        )));
    }

    Ok(())
}

fn validate_link_stage(name: &str, stage: &LinkStage) -> Result<(), ConfigError> {
    parse_selector(&stage.selector)?;

    if stage.visit_attr.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} stage needs a visit_attr",
            name
        )));
    }

    Ok(())
}

fn validate_detail_stage(stage: &DetailStage) -> Result<(), ConfigError> {
    if stage.selector.trim().is_empty() {
        return Err(ConfigError::Validation(
            "detail selector cannot be empty".to_string(),
        ));
    }

    parse_selector(&stage.selector)?;
    validate_directives(&stage.directives)
}

fn validate_secondary_stage(stage: &SecondaryStage) -> Result<(), ConfigError> {
    if stage.script.trim().is_empty() {
        return Err(ConfigError::Validation(
            "secondary_detail stage needs a script".to_string(),
        ));
    }

    parse_selector(&stage.selector)?;
    validate_directives(&stage.directives)
}

fn validate_directives(directives: &[ExtractionDirective]) -> Result<(), ConfigError> {
    for directive in directives {
        parse_selector(directive.method.selector()).map_err(|e| {
            ConfigError::InvalidDirective {
                var_name: directive.var_name.clone(),
                message: e.to_string(),
            }
        })?;
    }

    for (i, directive) in directives.iter().enumerate() {
        if directives[..i]
            .iter()
            .any(|d| d.var_name == directive.var_name)
        {
            return Err(ConfigError::InvalidDirective {
                var_name: directive.var_name.clone(),
                message: "variable declared twice".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ExtractionMethod;

    fn create_test_definition() -> ScraperDefinition {
        ScraperDefinition {
            scraper_id: "example-vr".to_string(),
            site_id: "Example VR".to_string(),
            studio: "Example Studio".to_string(),
            site_icon: String::new(),
            allowed_domains: vec!["example.com".to_string()],
            start_url: "https://example.com/videos".to_string(),
            listing: Some(LinkStage {
                selector: "div.card a".to_string(),
                visit_attr: "href".to_string(),
                skip_url_contains: vec![],
                skip_known: false,
            }),
            pagination: None,
            detail: DetailStage {
                selector: "main".to_string(),
                directives: vec![ExtractionDirective {
                    var_name: "title".to_string(),
                    method: ExtractionMethod::ChildText {
                        selector: "h1".to_string(),
                    },
                }],
            },
            secondary_detail: None,
        }
    }

    #[test]
    fn test_valid_definition() {
        assert!(validate(&create_test_definition()).is_ok());
    }

    #[test]
    fn test_empty_site_id() {
        let mut def = create_test_definition();
        def.site_id = "  ".to_string();
        assert!(matches!(validate(&def), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_start_url() {
        let mut def = create_test_definition();
        def.start_url = "not a url".to_string();
        assert!(matches!(validate(&def), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_non_http_start_url() {
        let mut def = create_test_definition();
        def.start_url = "ftp://example.com/".to_string();
        assert!(matches!(validate(&def), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_start_url_outside_allowed_domains() {
        let mut def = create_test_definition();
        def.start_url = "https://other.com/".to_string();
        assert!(matches!(validate(&def), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_wildcard_allowed_domain() {
        let mut def = create_test_definition();
        def.allowed_domains = vec!["*.example.com".to_string()];
        def.start_url = "https://www.example.com/".to_string();
        assert!(validate(&def).is_ok());
    }

    #[test]
    fn test_invalid_domain_patterns() {
        assert!(validate_domain_pattern("https://example.com").is_err());
        assert!(validate_domain_pattern("example.com/path").is_err());
        assert!(validate_domain_pattern("ex*mple.com").is_err());
        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.example.com").is_ok());
    }

    #[test]
    fn test_listing_without_visit_attr() {
        let mut def = create_test_definition();
        def.listing.as_mut().unwrap().visit_attr = String::new();
        assert!(matches!(validate(&def), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_pagination_without_listing() {
        let mut def = create_test_definition();
        def.listing = None;
        def.start_url = "https://example.com/scene/1".to_string();
        def.pagination = Some(LinkStage {
            selector: "a.next".to_string(),
            visit_attr: "href".to_string(),
            ..Default::default()
        });
        assert!(matches!(validate(&def), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_detail_selector() {
        let mut def = create_test_definition();
        def.detail.selector = "main[[".to_string();
        assert!(matches!(
            validate(&def),
            Err(ConfigError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_invalid_directive_selector() {
        let mut def = create_test_definition();
        def.detail.directives[0].method = ExtractionMethod::ChildText {
            selector: ">>>".to_string(),
        };
        assert!(matches!(
            validate(&def),
            Err(ConfigError::InvalidDirective { .. })
        ));
    }

    #[test]
    fn test_duplicate_directive_names() {
        let mut def = create_test_definition();
        let dup = def.detail.directives[0].clone();
        def.detail.directives.push(dup);
        assert!(matches!(
            validate(&def),
            Err(ConfigError::InvalidDirective { .. })
        ));
    }

    #[test]
    fn test_secondary_stage_requires_script() {
        let mut def = create_test_definition();
        def.secondary_detail = Some(SecondaryStage {
            selector: "ul.files".to_string(),
            script: String::new(),
            directives: vec![],
        });
        assert!(matches!(validate(&def), Err(ConfigError::Validation(_))));

        def.secondary_detail.as_mut().unwrap().script = "files.rhai".to_string();
        assert!(validate(&def).is_ok());
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(&CrawlerSettings::default()).is_ok());
    }

    #[test]
    fn test_settings_concurrency_bounds() {
        let mut settings = CrawlerSettings::default();
        settings.max_concurrent_requests = 0;
        assert!(validate_settings(&settings).is_err());
        settings.max_concurrent_requests = 65;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_settings_empty_user_agent() {
        let settings = CrawlerSettings {
            user_agent: String::new(),
            ..Default::default()
        };
        assert!(validate_settings(&settings).is_err());
    }
}
