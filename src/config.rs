use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::util::parse_bool_flag;

pub const DEFAULT_API_URL: &str = "https://text.pollinations.ai/openai";
pub const DEFAULT_MODEL: &str = "openai";

/// Language value meaning "do not steer the assistant toward any language".
pub const NO_LANGUAGE: &str = "no language";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub language: String,
    pub private: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url =
            std::env::var("CHATPANE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_key = std::env::var("CHATPANE_API_KEY").ok().and_then(|v| {
            if v.trim().is_empty() {
                None
            } else {
                Some(v)
            }
        });
        let model = std::env::var("CHATPANE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let language = std::env::var("CHATPANE_LANGUAGE")
            .map(|v| v.trim().to_lowercase())
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| NO_LANGUAGE.to_string());
        let private = std::env::var("CHATPANE_PRIVATE")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(false);

        Ok(Self {
            api_key,
            api_url,
            model,
            language,
            private,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid CHATPANE_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if self.model.trim().is_empty() {
            bail!("CHATPANE_MODEL must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            language: NO_LANGUAGE.to_string(),
            private: false,
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_http_url() {
        let config = Config {
            api_url: "ftp://text.pollinations.ai/openai".to_string(),
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_model() {
        let config = Config {
            model: "  ".to_string(),
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_defaults_without_env() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::remove_var("CHATPANE_API_URL");
        std::env::remove_var("CHATPANE_API_KEY");
        std::env::remove_var("CHATPANE_MODEL");
        std::env::remove_var("CHATPANE_LANGUAGE");
        std::env::remove_var("CHATPANE_PRIVATE");

        let config = Config::load().expect("load");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.language, NO_LANGUAGE);
        assert!(config.api_key.is_none());
        assert!(!config.private);
    }

    #[test]
    fn test_load_normalizes_language_case() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var("CHATPANE_LANGUAGE", " Python ");
        let config = Config::load().expect("load");
        assert_eq!(config.language, "python");
        std::env::remove_var("CHATPANE_LANGUAGE");
    }
}
