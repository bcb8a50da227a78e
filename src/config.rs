/*
 * Responsibility
 * - Load settings from the environment (.env via dotenvy)
 * - Validate them up front (missing signing material fails startup)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Token signing material. An Ed25519 pair wins over a shared secret.
#[derive(Clone)]
pub enum SigningKey {
    Secret(String),
    EdPem { private_pem: String, public_pem: String },
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKey::Secret(_) => f.write_str("SigningKey::Secret(..)"),
            SigningKey::EdPem { .. } => f.write_str("SigningKey::EdPem(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub issuer: String,
    pub signing_key: SigningKey,
    // Key / PAT lifetimes (seconds)
    pub login_duration_seconds: u64,
    pub pat_default_duration_seconds: u64,

    // Valkey/Redis for the scope cache; in-memory when unset
    pub cache_url: Option<String>,
    pub cache_key_prefix: String,
    pub cache_ttl_seconds: u64,

    pub callback_urls: Vec<String>,
    pub callback_method: String,
    pub callback_timeout_seconds: u64,

    pub admin_ids: Vec<String>,
    pub request_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = parse_or(&var, "AUTH_HTTP_PORT", 9001)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("AUTH_HTTP_PORT"))?;

        let app_env = AppEnv::parse(var("APP_ENV"));
        let issuer = var("AUTH_ISSUER").unwrap_or_else(|| "iot-auth".to_string());

        let signing_key = match (
            var("AUTH_JWT_PRIVATE_KEY_PEM"),
            var("AUTH_JWT_PUBLIC_KEY_PEM"),
        ) {
            (Some(private_pem), Some(public_pem)) => SigningKey::EdPem {
                private_pem: private_pem.replace("\\n", "\n"),
                public_pem: public_pem.replace("\\n", "\n"),
            },
            (Some(_), None) => return Err(ConfigError::Missing("AUTH_JWT_PUBLIC_KEY_PEM")),
            (None, Some(_)) => return Err(ConfigError::Missing("AUTH_JWT_PRIVATE_KEY_PEM")),
            (None, None) => SigningKey::Secret(
                var("AUTH_SECRET_KEY").ok_or(ConfigError::Missing("AUTH_SECRET_KEY"))?,
            ),
        };

        let login_duration_seconds = parse_or(&var, "AUTH_LOGIN_DURATION_SECONDS", 36_000)?;
        let pat_default_duration_seconds =
            parse_or(&var, "AUTH_PAT_DEFAULT_DURATION_SECONDS", 30 * 24 * 60 * 60)?;

        let cache_url = var("AUTH_CACHE_URL");
        let cache_key_prefix = var("AUTH_CACHE_KEY_PREFIX").unwrap_or_else(|| "pat:scope".to_string());
        let cache_ttl_seconds = parse_or(&var, "AUTH_CACHE_TTL_SECONDS", 3_600)?;

        let callback_urls = split_list(var("AUTH_CALLBACK_URLS"));
        let callback_method = var("AUTH_CALLBACK_METHOD")
            .unwrap_or_else(|| "POST".to_string())
            .to_ascii_uppercase();
        if !matches!(callback_method.as_str(), "GET" | "POST") {
            return Err(ConfigError::Invalid("AUTH_CALLBACK_METHOD"));
        }
        let callback_timeout_seconds = parse_or(&var, "AUTH_CALLBACK_TIMEOUT_SECONDS", 5)?;

        let admin_ids = split_list(var("AUTH_ADMIN_IDS"));
        let request_timeout_seconds = parse_or(&var, "AUTH_REQUEST_TIMEOUT_SECONDS", 30)?;

        Ok(Self {
            addr,
            app_env,
            issuer,
            signing_key,
            login_duration_seconds,
            pat_default_duration_seconds,
            cache_url,
            cache_key_prefix,
            cache_ttl_seconds,
            callback_urls,
            callback_method,
            callback_timeout_seconds,
            admin_ids,
            request_timeout_seconds,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_with_secret() {
        let config = load(&[("AUTH_SECRET_KEY", "s3cret")]).unwrap();
        assert_eq!(config.addr.port(), 9001);
        assert_eq!(config.issuer, "iot-auth");
        assert!(matches!(config.signing_key, SigningKey::Secret(ref s) if s == "s3cret"));
        assert_eq!(config.login_duration_seconds, 36_000);
        assert_eq!(config.cache_key_prefix, "pat:scope");
        assert!(config.cache_url.is_none());
        assert_eq!(config.callback_method, "POST");
        assert!(config.callback_urls.is_empty());
        assert_eq!(config.app_env, AppEnv::Development);
    }

    #[test]
    fn signing_material_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("AUTH_SECRET_KEY"));
        assert_eq!(
            load(&[("AUTH_JWT_PRIVATE_KEY_PEM", "pem")]).unwrap_err(),
            ConfigError::Missing("AUTH_JWT_PUBLIC_KEY_PEM")
        );
    }

    #[test]
    fn pem_pair_wins_and_newlines_are_unescaped() {
        let config = load(&[
            ("AUTH_SECRET_KEY", "ignored"),
            ("AUTH_JWT_PRIVATE_KEY_PEM", "line1\\nline2"),
            ("AUTH_JWT_PUBLIC_KEY_PEM", "pub"),
        ])
        .unwrap();
        match config.signing_key {
            SigningKey::EdPem { private_pem, .. } => assert_eq!(private_pem, "line1\nline2"),
            other => panic!("unexpected signing key {other:?}"),
        }
    }

    #[test]
    fn lists_and_invalid_values() {
        let config = load(&[
            ("AUTH_SECRET_KEY", "s"),
            ("AUTH_CALLBACK_URLS", "http://a/authz, ,http://b/authz"),
            ("AUTH_CALLBACK_METHOD", "get"),
            ("AUTH_ADMIN_IDS", "root"),
            ("APP_ENV", "prod"),
        ])
        .unwrap();
        assert_eq!(config.callback_urls, vec!["http://a/authz", "http://b/authz"]);
        assert_eq!(config.callback_method, "GET");
        assert_eq!(config.admin_ids, vec!["root"]);
        assert!(config.app_env.is_production());

        assert_eq!(
            load(&[("AUTH_SECRET_KEY", "s"), ("AUTH_HTTP_PORT", "http")]).unwrap_err(),
            ConfigError::Invalid("AUTH_HTTP_PORT")
        );
        assert_eq!(
            load(&[("AUTH_SECRET_KEY", "s"), ("AUTH_CALLBACK_METHOD", "PUT")]).unwrap_err(),
            ConfigError::Invalid("AUTH_CALLBACK_METHOD")
        );
    }
}
