//! Client configuration for the hosted backend.
//!
//! Both clients discover the same two values: the public API key for the
//! identity provider and the realtime database URL.

use crate::util::{is_http_url, normalize_text_option};

/// Connection values for the hosted identity and database services.
///
/// These are safe-to-ship public endpoint values; secret credentials must
/// never be stored here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    pub api_key: Option<String>,
    pub database_url: Option<String>,
}

impl RemoteConfig {
    /// Read configuration from `MINDLY_API_KEY` and `MINDLY_DATABASE_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: normalize_text_option(std::env::var("MINDLY_API_KEY").ok()),
            database_url: normalize_text_option(std::env::var("MINDLY_DATABASE_URL").ok()),
        }
    }

    /// Validate the config and unpack the values every client needs.
    pub fn resolve(&self) -> Result<ResolvedRemoteConfig, String> {
        let Some(api_key) = normalize_text_option(self.api_key.clone()) else {
            return Err("MINDLY_API_KEY is not set".to_string());
        };
        let Some(database_url) = normalize_text_option(self.database_url.clone()) else {
            return Err("MINDLY_DATABASE_URL is not set".to_string());
        };
        if !is_http_url(&database_url) {
            return Err(format!(
                "Database URL must include http:// or https://, got {database_url:?}"
            ));
        }

        Ok(ResolvedRemoteConfig {
            api_key,
            database_url: database_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Validated, non-optional connection values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRemoteConfig {
    pub api_key: String,
    pub database_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_requires_both_values() {
        let missing_key = RemoteConfig {
            api_key: None,
            database_url: Some("https://demo.firebaseio.com".to_string()),
        };
        assert!(missing_key.resolve().unwrap_err().contains("MINDLY_API_KEY"));

        let missing_url = RemoteConfig {
            api_key: Some("AIzaSyExample".to_string()),
            database_url: Some("   ".to_string()),
        };
        assert!(missing_url
            .resolve()
            .unwrap_err()
            .contains("MINDLY_DATABASE_URL"));
    }

    #[test]
    fn resolve_normalizes_the_database_url() {
        let config = RemoteConfig {
            api_key: Some("  AIzaSyExample  ".to_string()),
            database_url: Some("https://demo.firebaseio.com/".to_string()),
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.api_key, "AIzaSyExample");
        assert_eq!(resolved.database_url, "https://demo.firebaseio.com");
    }

    #[test]
    fn resolve_rejects_non_http_database_urls() {
        let config = RemoteConfig {
            api_key: Some("AIzaSyExample".to_string()),
            database_url: Some("demo.firebaseio.com".to_string()),
        };
        assert!(config.resolve().is_err());
    }
}
