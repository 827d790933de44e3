use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::core::error::HawkError;

/// Engine configuration, loaded from TOML with compiled defaults for
/// every field so a bare deployment works without a config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub bind_addr: String,
    pub request_timeout_ms: u64,
    pub dns_timeout_ms: u64,
    pub tls_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub whois_timeout_ms: u64,
    pub max_redirects: u32,
    pub max_body_bytes: usize,
    pub cache_enabled: bool,
    pub cache_ttl_s: u64,
    pub cache_size: usize,
    pub whois_enabled: bool,
    pub http_per_host_concurrency: usize,
    pub http_global_concurrency: usize,
    pub rate_limit_per_minute: u32,
    pub user_agent: String,
    pub model_path: Option<String>,
    pub reputation_path: Option<String>,
    pub psl_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            bind_addr: "127.0.0.1:8300".to_string(),
            request_timeout_ms: 8_000,
            dns_timeout_ms: 1_500,
            tls_timeout_ms: 3_000,
            http_timeout_ms: 5_000,
            whois_timeout_ms: 5_000,
            max_redirects: 5,
            max_body_bytes: 256 * 1024,
            cache_enabled: true,
            cache_ttl_s: 600,
            cache_size: 1024,
            whois_enabled: false,
            http_per_host_concurrency: 4,
            http_global_concurrency: 64,
            rate_limit_per_minute: 120,
            user_agent: concat!("urlhawk/", env!("CARGO_PKG_VERSION")).to_string(),
            model_path: None,
            reputation_path: None,
            psl_path: None,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn tls_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_millis(self.whois_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_s)
    }
}

pub fn load_config(path: Option<&str>) -> Result<AppConfig, HawkError> {
    let default_path = Path::new("config/urlhawk.toml");
    let path = path.map(Path::new).unwrap_or(default_path);

    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| HawkError::Config(e.to_string()))?;
    let cfg: AppConfig = toml::from_str(&content).map_err(|e| HawkError::Config(e.to_string()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.request_timeout_ms, 8_000);
        assert_eq!(cfg.dns_timeout_ms, 1_500);
        assert_eq!(cfg.tls_timeout_ms, 3_000);
        assert_eq!(cfg.http_timeout_ms, 5_000);
        assert_eq!(cfg.max_redirects, 5);
        assert_eq!(cfg.cache_ttl_s, 600);
        assert_eq!(cfg.cache_size, 1024);
        assert!(!cfg.whois_enabled);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: AppConfig = toml::from_str("request_timeout_ms = 2000\n").unwrap();
        assert_eq!(cfg.request_timeout_ms, 2_000);
        assert_eq!(cfg.max_redirects, 5);
        assert!(cfg.cache_enabled);
    }
}
