use std::fmt;
use std::path::PathBuf;

/// Errors that can occur when reading configuration from the environment.
#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    Missing(&'static str),
    /// A variable is set but unusable.
    Invalid { var: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(var) => write!(f, "required environment variable {var} is not set"),
            Self::Invalid { var, reason } => write!(f, "invalid value for {var}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

const DEFAULT_PORT: u16 = 5000;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug)]
pub struct Config {
    pub line_channel_access_token: String,
    /// Shared secret the platform signs webhook bodies with.
    pub line_channel_secret: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub notion_api_key: String,
    pub notion_database_id: String,
    pub port: u16,
    /// Directory for the file log layer. Logs go to stdout only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| -> Result<String, ConfigError> {
            match get(var) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(ConfigError::Missing(var)),
            }
        };

        let line_channel_access_token = required("LINE_CHANNEL_ACCESS_TOKEN")?;
        let line_channel_secret = required("LINE_CHANNEL_SECRET")?;
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let notion_api_key = required("NOTION_API_KEY")?;
        let notion_database_id = required("NOTION_DATABASE_ID")?;

        let gemini_model = get("GEMINI_MODEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        let port = match get("PORT") {
            Some(value) => value.parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let log_dir = get("LOG_DIR").filter(|v| !v.is_empty()).map(PathBuf::from);

        Ok(Self {
            line_channel_access_token,
            line_channel_secret,
            gemini_api_key,
            gemini_model,
            notion_api_key,
            notion_database_id,
            port,
            log_dir,
        })
    }
}
