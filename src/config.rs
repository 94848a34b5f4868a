use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use shuttle_runtime::SecretStore;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiProvider {
    Gemini,
    OpenAi,
    /// Deterministic local responder, no network.
    Scripted,
}

impl FromStr for AiProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(AiProvider::Gemini),
            "openai" => Ok(AiProvider::OpenAi),
            "scripted" => Ok(AiProvider::Scripted),
            other => Err(anyhow!("Unknown AI_PROVIDER: {}", other)),
        }
    }
}

#[derive(Clone)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub max_output_tokens: u32,
}

#[derive(Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub database_url: String,
    pub ai: AiConfig,
    pub client_url: String,
    pub environment: String,
    /// Present only when all three Google secrets are set.
    pub google: Option<GoogleOAuthConfig>,
}

impl AppConfig {
    pub const DEFAULT_AI_MODEL: &'static str = "gemini-2.5-flash";
    pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2000;
    pub const DEFAULT_CLIENT_URL: &'static str = "http://localhost:3000";

    pub fn new(secret_store: &SecretStore) -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| secret_store.get(key))
    }

    /// Builds the config from any key lookup; `new` plugs in the secret store.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET not found"))?;

        let database_url = get("DATABASE_URL").ok_or_else(|| anyhow!("DATABASE_URL not found"))?;

        let provider = match get("AI_PROVIDER") {
            Some(value) => value.parse()?,
            None => AiProvider::Gemini,
        };

        let api_key = match provider {
            AiProvider::Scripted => get("AI_API_KEY").unwrap_or_default(),
            _ => get("AI_API_KEY").ok_or_else(|| anyhow!("AI_API_KEY not found"))?,
        };

        let timeout_secs = match get("AI_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|e| anyhow!("AI_TIMEOUT_SECS is not a number: {}", e))?,
            None => Self::DEFAULT_AI_TIMEOUT_SECS,
        };

        let max_output_tokens = match get("AI_MAX_OUTPUT_TOKENS") {
            Some(value) => value
                .parse::<u32>()
                .map_err(|e| anyhow!("AI_MAX_OUTPUT_TOKENS is not a number: {}", e))?,
            None => Self::DEFAULT_MAX_OUTPUT_TOKENS,
        };

        let ai = AiConfig {
            provider,
            api_key,
            model: get("AI_MODEL").unwrap_or_else(|| Self::DEFAULT_AI_MODEL.to_string()),
            base_url: get("AI_BASE_URL"),
            timeout: Duration::from_secs(timeout_secs),
            max_output_tokens,
        };

        let google = match (
            get("GOOGLE_CLIENT_ID"),
            get("GOOGLE_CLIENT_SECRET"),
            get("GOOGLE_REDIRECT_URL"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_url)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_url,
            }),
            (None, None, None) => None,
            _ => {
                warn!("Incomplete Google OAuth secrets, Google sign-in disabled");
                None
            }
        };

        Ok(AppConfig {
            jwt_secret,
            database_url,
            ai,
            client_url: get("CLIENT_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| Self::DEFAULT_CLIENT_URL.to_string()),
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            google,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
