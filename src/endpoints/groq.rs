//! Groq regional endpoint normalization.
//!
//! Regional `groqcloud.com` hosts are unreliable for tool-using models, so
//! every regional base URL is rewritten to the global endpoint before any
//! traffic is sent.

use once_cell::sync::Lazy;
use regex::Regex;

/// The global Groq endpoint every regional URL is rewritten to.
pub const GROQ_GLOBAL_ENDPOINT: &str = "https://api.groq.com/openai/v1";

static GROQ_REGIONAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://api\.([a-z0-9-]+\.)?groqcloud\.com/openai/v1$").unwrap()
});

/// Whether a base URL points at a regional Groq host.
pub fn is_groq_regional_endpoint(url: &str) -> bool {
    url::Url::parse(url).is_ok() && GROQ_REGIONAL_PATTERN.is_match(url)
}

/// Rewrite a regional Groq base URL to the global endpoint. Any other URL
/// passes through untouched.
pub fn groq_global_endpoint(url: &str) -> &str {
    if is_groq_regional_endpoint(url) {
        GROQ_GLOBAL_ENDPOINT
    } else {
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regional_host_without_label_matches() {
        assert!(is_groq_regional_endpoint("https://api.groqcloud.com/openai/v1"));
    }

    #[test]
    fn regional_host_with_label_matches() {
        assert!(is_groq_regional_endpoint(
            "https://api.me-central-1.groqcloud.com/openai/v1"
        ));
        assert!(is_groq_regional_endpoint(
            "https://api.eu-west-2.groqcloud.com/openai/v1"
        ));
    }

    #[test]
    fn global_endpoint_is_not_regional() {
        assert!(!is_groq_regional_endpoint(GROQ_GLOBAL_ENDPOINT));
    }

    #[test]
    fn near_misses_do_not_match() {
        assert!(!is_groq_regional_endpoint("http://api.groqcloud.com/openai/v1"));
        assert!(!is_groq_regional_endpoint("https://api.groqcloud.com/openai/v1/"));
        assert!(!is_groq_regional_endpoint("https://api.groqcloud.com/v1"));
        assert!(!is_groq_regional_endpoint("https://groqcloud.com/openai/v1"));
        assert!(!is_groq_regional_endpoint("not a url"));
    }

    #[test]
    fn rewrite_only_touches_regional_urls() {
        assert_eq!(
            groq_global_endpoint("https://api.me-central-1.groqcloud.com/openai/v1"),
            GROQ_GLOBAL_ENDPOINT
        );
        assert_eq!(
            groq_global_endpoint("https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
    }
}
