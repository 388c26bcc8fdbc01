use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;

use crate::gemini::Auth;

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv().ok(); // Load .env file if present
    Config {
        port: get_env_or_default("PORT", "8080")
            .parse()
            .unwrap_or_else(|_| panic!("PORT must be a number")),
        gemini_model: get_env_or_default("GEMINI_MODEL", "gemini-2.5-flash"),
        gemini_api_key: env::var("GEMINI_API_KEY").ok(),
        gemini_access_token: env::var("GEMINI_ACCESS_TOKEN").ok(),
        rate_limit_max: get_env_or_default("RATE_LIMIT_MAX", "10")
            .parse()
            .unwrap_or_else(|_| panic!("RATE_LIMIT_MAX must be a number")),
        rate_limit_window_ms: get_env_or_default("RATE_LIMIT_WINDOW_MS", "60000")
            .parse()
            .unwrap_or_else(|_| panic!("RATE_LIMIT_WINDOW_MS must be a number")),
    }
});

pub struct Config {
    pub port: u16,
    pub gemini_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_access_token: Option<String>,
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
}

impl Config {
    /// Resolve the model-provider credential. An access token (the ADC-style
    /// deployment) takes precedence over a direct API key.
    pub fn auth(&self) -> Auth {
        if let Some(token) = &self.gemini_access_token {
            Auth::Bearer(token.clone())
        } else if let Some(key) = &self.gemini_api_key {
            Auth::ApiKey(key.clone())
        } else {
            panic!("Missing required environment variable: GEMINI_API_KEY or GEMINI_ACCESS_TOKEN")
        }
    }
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
