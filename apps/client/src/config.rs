//! Client configuration from the environment.

use std::path::PathBuf;

use thiserror::Error;

use crate::identity::CurrentUser;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub user: CurrentUser,
    /// Backend to sync with. Without one, an in-process store is used.
    pub backend_url: Option<String>,
    pub api_token: Option<String>,
    pub database_path: PathBuf,
    pub quiz_seed: Option<u64>,
}

impl ClientConfig {
    /// Read the configuration, loading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let email = get("LEXICON_USER_EMAIL").ok_or(ConfigError::Missing("LEXICON_USER_EMAIL"))?;
        if !email.contains('@') {
            return Err(ConfigError::Invalid {
                name: "LEXICON_USER_EMAIL",
                message: format!("not an email address: {email}"),
            });
        }
        let display_name = get("LEXICON_DISPLAY_NAME").unwrap_or_else(|| {
            email.split('@').next().unwrap_or_default().to_string()
        });

        let quiz_seed = get("LEXICON_QUIZ_SEED")
            .map(|seed| {
                seed.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: "LEXICON_QUIZ_SEED",
                    message: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            user: CurrentUser::new(&email, display_name),
            backend_url: get("LEXICON_BACKEND_URL"),
            api_token: get("LEXICON_API_TOKEN"),
            database_path: get("LEXICON_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_database_path),
            quiz_seed,
        })
    }
}

pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lexicon")
        .join("lexicon.db")
}
