use std::env;

use crate::error::{AppError, AppResult};

const GMAIL_API_BASE: &str = "https://www.googleapis.com/gmail/v1/users/me";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CHAT_API_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f64 = 0.3;
const DEFAULT_PORT: u16 = 8080;

/// Secrets that must be present before any network call is made.
const REQUIRED_VARS: [&str; 3] = [
    "GMAIL_CLIENT_ID",
    "GMAIL_CLIENT_SECRET",
    "GMAIL_REFRESH_TOKEN",
];

#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_uri: String,
    pub api_base: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        GmailConfig {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            api_base: GMAIL_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    pub key: String,
    pub endpoint: String,
    pub model: String,
    pub temperature: f64,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        ChatApiConfig {
            key: String::new(),
            endpoint: CHAT_API_ENDPOINT.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// The whole configuration surface, read once at startup and passed into
/// components. Nothing below `main` touches ambient environment state.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub gmail: GmailConfig,
    pub chat: ChatApiConfig,
    /// Digest recipient override; `None` means the mailbox owner.
    pub summary_recipient: Option<String>,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let gmail = GmailConfig {
            client_id: env::var("GMAIL_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("GMAIL_CLIENT_SECRET").unwrap_or_default(),
            refresh_token: env::var("GMAIL_REFRESH_TOKEN").unwrap_or_default(),
            ..GmailConfig::default()
        };

        let chat = ChatApiConfig {
            key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: env::var("OPENAI_MODEL").unwrap_or(DEFAULT_CHAT_MODEL.to_string()),
            ..ChatApiConfig::default()
        };

        let summary_recipient = env::var("SUMMARY_EMAIL").ok().filter(|s| !s.is_empty());

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        AppConfig {
            gmail,
            chat,
            summary_recipient,
            port,
        }
    }

    /// Pre-flight check on the mailbox secrets. An unset and an empty
    /// variable are treated the same, and every missing name is reported.
    pub fn validate(&self) -> AppResult<()> {
        let values = [
            &self.gmail.client_id,
            &self.gmail.client_secret,
            &self.gmail.refresh_token,
        ];

        let missing = REQUIRED_VARS
            .iter()
            .zip(values)
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name.to_string())
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(AppError::MissingConfig(missing));
        }

        Ok(())
    }

    /// Where the digest goes. `"me"` is the Gmail sentinel for the
    /// authenticated mailbox owner.
    pub fn recipient(&self) -> &str {
        self.summary_recipient.as_deref().unwrap_or("me")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> AppConfig {
        AppConfig {
            gmail: GmailConfig {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                refresh_token: "refresh".to_string(),
                ..GmailConfig::default()
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn validate_passes_with_all_secrets() {
        assert!(full_config().validate().is_ok());
    }

    #[test]
    fn validate_reports_every_missing_secret() {
        let config = AppConfig::default();

        match config.validate() {
            Err(AppError::MissingConfig(missing)) => {
                assert_eq!(
                    missing,
                    vec![
                        "GMAIL_CLIENT_ID".to_string(),
                        "GMAIL_CLIENT_SECRET".to_string(),
                        "GMAIL_REFRESH_TOKEN".to_string(),
                    ]
                );
            }
            other => panic!("Expected MissingConfig, got {:?}", other),
        }
    }

    #[test]
    fn validate_treats_empty_as_missing() {
        let mut config = full_config();
        config.gmail.client_secret = String::new();

        match config.validate() {
            Err(AppError::MissingConfig(missing)) => {
                assert_eq!(missing, vec!["GMAIL_CLIENT_SECRET".to_string()]);
            }
            other => panic!("Expected MissingConfig, got {:?}", other),
        }
    }

    #[test]
    fn recipient_defaults_to_mailbox_owner_sentinel() {
        let config = AppConfig::default();
        assert_eq!(config.recipient(), "me");

        let config = AppConfig {
            summary_recipient: Some("digest@example.com".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.recipient(), "digest@example.com");
    }
}
