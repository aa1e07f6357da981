use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::warn;

const DEV_SECRET_KEY: &str = "web-downloader-insecure-development-key";
const DEBUG_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub secret_key: String,
    pub debug: bool,
    pub allowed_hosts: Vec<String>,
    pub download_dir: PathBuf,
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub ytdlp_path: String,
    pub max_concurrent_downloads: usize,
    pub retention: Duration,
    pub cleanup_interval: Duration,
    pub metadata_timeout: Duration,
    pub session_cookie_secure: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let debug = get("DEBUG").map(|v| parse_bool(&v)).unwrap_or(false);

        let secret_key = match get("SECRET_KEY") {
            Some(k) => k,
            None if debug => {
                warn!("SECRET_KEY not set; using the development key (DEBUG only)");
                DEV_SECRET_KEY.to_string()
            }
            None => bail!("Missing required env var: SECRET_KEY (or set DEBUG=true)"),
        };

        let mut allowed_hosts: Vec<String> = get("ALLOWED_HOSTS")
            .map(|v| {
                v.split(',')
                    .map(|h| h.trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if allowed_hosts.is_empty() && debug {
            allowed_hosts = DEBUG_HOSTS.iter().map(|h| h.to_string()).collect();
        }

        let max_concurrent_downloads = parse_positive(&get, "MAX_CONCURRENT_DOWNLOADS", 2)?;
        let retention_hours = parse_positive(&get, "DOWNLOAD_RETENTION_HOURS", 24)?;
        let cleanup_minutes = parse_positive(&get, "CLEANUP_INTERVAL_MINUTES", 60)?;
        let metadata_secs = parse_positive(&get, "METADATA_TIMEOUT_SECS", 60)?;

        let session_cookie_secure = get("SESSION_COOKIE_SECURE").map(|v| parse_bool(&v)).unwrap_or(false);

        if secret_key.len() < 16 && !debug {
            bail!("SECRET_KEY must be at least 16 characters");
        }

        Ok(Self {
            secret_key,
            debug,
            allowed_hosts,
            download_dir: get("DOWNLOAD_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("downloads")),
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/web_downloader.sqlite3")),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            ytdlp_path: get("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string()),
            max_concurrent_downloads: max_concurrent_downloads as usize,
            retention: Duration::from_secs(retention_hours * 3600),
            cleanup_interval: Duration::from_secs(cleanup_minutes * 60),
            metadata_timeout: Duration::from_secs(metadata_secs),
            session_cookie_secure,
        })
    }

    /// Matches a `Host` header value (port stripped) against `ALLOWED_HOSTS`.
    /// `*` allows anything; a leading dot allows the domain and its subdomains.
    pub fn host_allowed(&self, host: &str) -> bool {
        let host = strip_port(host.trim()).to_ascii_lowercase();
        if host.is_empty() {
            return false;
        }
        self.allowed_hosts.iter().any(|pattern| {
            if pattern == "*" {
                return true;
            }
            if let Some(domain) = pattern.strip_prefix('.') {
                return host == domain || host.ends_with(pattern.as_str());
            }
            host == *pattern
        })
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_positive<G>(get: &G, key: &str, default: u64) -> Result<u64>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    let v: u64 = raw
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got {raw:?}"))?;
    if v == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(v)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // [::1]:8000
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn production_requires_secret() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("SECRET_KEY"));
    }

    #[test]
    fn short_secret_only_allowed_in_debug() {
        let err = config(&[("SECRET_KEY", "tooshort")]).unwrap_err();
        assert!(err.to_string().contains("at least 16 characters"));
        assert!(config(&[("SECRET_KEY", "tooshort"), ("DEBUG", "true")]).is_ok());
        assert!(config(&[("SECRET_KEY", "0123456789abcdef")]).is_ok());
    }

    #[test]
    fn debug_defaults() {
        let cfg = config(&[("DEBUG", "true")]).unwrap();
        assert_eq!(cfg.secret_key, DEV_SECRET_KEY);
        assert_eq!(cfg.download_dir, PathBuf::from("downloads"));
        assert_eq!(cfg.database_path, PathBuf::from("data/web_downloader.sqlite3"));
        assert_eq!(cfg.bind_addr, "0.0.0.0:8000");
        assert_eq!(cfg.max_concurrent_downloads, 2);
        assert_eq!(cfg.retention, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.cleanup_interval, Duration::from_secs(3600));
        assert!(cfg.host_allowed("localhost:8000"));
        assert!(cfg.host_allowed("[::1]:8000"));
        assert!(!cfg.host_allowed("evil.example"));
    }

    #[test]
    fn rejects_zero_and_garbage_numbers() {
        assert!(config(&[("DEBUG", "1"), ("MAX_CONCURRENT_DOWNLOADS", "0")]).is_err());
        assert!(config(&[("DEBUG", "1"), ("DOWNLOAD_RETENTION_HOURS", "soon")]).is_err());
    }

    #[test]
    fn allowed_hosts_patterns() {
        let cfg = config(&[
            ("SECRET_KEY", "0123456789abcdef0123"),
            ("ALLOWED_HOSTS", "example.com, .videos.test"),
        ])
        .unwrap();
        assert!(cfg.host_allowed("example.com"));
        assert!(cfg.host_allowed("EXAMPLE.com:443"));
        assert!(!cfg.host_allowed("www.example.com"));
        assert!(cfg.host_allowed("videos.test"));
        assert!(cfg.host_allowed("a.videos.test"));
        assert!(!cfg.host_allowed("badvideos.test"));
        assert!(!cfg.host_allowed(""));

        let any = config(&[("SECRET_KEY", "0123456789abcdef0123"), ("ALLOWED_HOSTS", "*")]).unwrap();
        assert!(any.host_allowed("anything.at.all"));
    }
}
