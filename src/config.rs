//! Service configuration, read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_BCRYPT_COST: u32 = 10;
const DEFAULT_CORS_ORIGINS: &str = "https://smart-attend-puce.vercel.app,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    /// Directory holding the SQLite database.
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    /// Validity of the signed session token.
    pub token_ttl: Duration,
    /// Max-Age of the `token` cookie. Shorter than `token_ttl` by default,
    /// so browsers drop the cookie before the token itself expires.
    pub cookie_max_age: Duration,
    pub bcrypt_cost: u32,
    pub cors_origins: Vec<String>,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn new(jwt_secret: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            data_dir: data_dir.into(),
            jwt_secret: jwt_secret.into(),
            token_ttl: Duration::from_secs(5 * 60 * 60),
            cookie_max_age: Duration::from_secs(2 * 60 * 60),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            cors_origins: split_origins(DEFAULT_CORS_ORIGINS),
            sweep_interval: Duration::from_secs(60),
        }
    }

    pub fn from_env() -> Result<Self> {
        let jwt_secret =
            std::env::var("JWT_SECRET").context("JWT_SECRET environment variable required")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into());
        let mut cfg = Self::new(jwt_secret, data_dir);

        if let Ok(host) = std::env::var("HOST") {
            let ip = host
                .parse::<std::net::IpAddr>()
                .with_context(|| format!("Invalid HOST {:?}", host))?;
            cfg.addr.set_ip(ip);
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            cfg.addr.set_port(port);
        }
        if let Some(secs) = env_parse::<u64>("TOKEN_TTL_SECS")? {
            cfg.token_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("COOKIE_MAX_AGE_SECS")? {
            cfg.cookie_max_age = Duration::from_secs(secs);
        }
        if let Some(cost) = env_parse::<u32>("BCRYPT_COST")? {
            if !(4..=31).contains(&cost) {
                anyhow::bail!("BCRYPT_COST must be between 4 and 31");
            }
            cfg.bcrypt_cost = cost;
        }
        if let Some(secs) = env_parse::<u64>("SWEEP_INTERVAL_SECS")? {
            if secs == 0 {
                anyhow::bail!("SWEEP_INTERVAL_SECS must be positive");
            }
            cfg.sweep_interval = Duration::from_secs(secs);
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            cfg.cors_origins = parse_cors_origins(&origins)?;
        }

        Ok(cfg)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid {} {:?}", key, raw)),
        Err(_) => Ok(None),
    }
}

/// Explicit origins only: credentialed CORS cannot use the `*` wildcard.
fn parse_cors_origins(raw: &str) -> Result<Vec<String>> {
    let origins = split_origins(raw);
    if origins.iter().any(|o| o == "*") {
        anyhow::bail!("CORS_ORIGINS must list explicit origins; \"*\" is not allowed with credentials");
    }
    Ok(origins)
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_cookie_shorter_than_token() {
        let cfg = Config::new("secret", "/tmp/x");
        assert_eq!(cfg.token_ttl, Duration::from_secs(18_000));
        assert_eq!(cfg.cookie_max_age, Duration::from_secs(7_200));
        assert_eq!(cfg.bcrypt_cost, 10);
        assert_eq!(cfg.addr.port(), 5000);
        assert_eq!(cfg.cors_origins.len(), 2);
    }

    #[test]
    fn split_origins_skips_blanks() {
        assert_eq!(
            split_origins(" http://a.test , ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn wildcard_cors_origin_is_rejected() {
        let err = parse_cors_origins("http://a.test, *").unwrap_err();
        assert!(err.to_string().contains("CORS_ORIGINS"), "{}", err);
        assert_eq!(
            parse_cors_origins("http://a.test").unwrap(),
            vec!["http://a.test".to_string()]
        );
    }
}
