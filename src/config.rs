use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// One configured forwarding route: `POST /api/<name>` relays the request
/// body to `url`.
#[derive(Debug, Clone)]
pub struct WebhookRoute {
    pub name: String,
    pub url: String,
}

/// Server configuration, loaded from environment variables.
///
/// - `NEXIUM_HOST` (default: 0.0.0.0) - Bind address
/// - `NEXIUM_PORT` (default: 3000) - Listening port
/// - `NEXIUM_DATA_DIR` (default: ./data) - Directory for the JSON documents
/// - `NEXIUM_PROFILE_API_URL` (default: https://users.roblox.com) - Profile API base URL
/// - `NEXIUM_UPSTREAM_TIMEOUT_SECS` (default: 10) - Timeout for outbound calls
/// - `NEXIUM_RATE_LIMIT` (default: 100) - Requests per client per window
/// - `NEXIUM_RATE_WINDOW_SECS` (default: 60) - Fixed-window length
/// - `NEXIUM_REFRESH_INTERVAL_SECS` (default: 300) - Background profile
///   refresh period; 0 disables the task
/// - `NEXIUM_WEBHOOKS` (optional) - Comma-separated `name=url` pairs
/// - `NEXIUM_CORS_ORIGINS` (optional) - Comma-separated allowed origins;
///   empty means any origin
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    pub profile_api_url: String,
    pub upstream_timeout: Duration,
    pub rate_limit: u32,
    pub rate_window_secs: u64,
    pub refresh_interval_secs: u64,
    pub webhooks: Vec<WebhookRoute>,
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn load() -> Result<Self, String> {
        let host: IpAddr = env_or("NEXIUM_HOST", "0.0.0.0")
            .parse()
            .map_err(|_| "NEXIUM_HOST must be a valid IP address".to_string())?;

        let port: u16 = env_or("NEXIUM_PORT", "3000")
            .parse()
            .map_err(|_| "NEXIUM_PORT must be a valid port number".to_string())?;

        let data_dir = PathBuf::from(env_or("NEXIUM_DATA_DIR", "./data"));

        let profile_api_url = env_or("NEXIUM_PROFILE_API_URL", "https://users.roblox.com");

        let upstream_timeout_secs: u64 = env_or("NEXIUM_UPSTREAM_TIMEOUT_SECS", "10")
            .parse()
            .map_err(|_| "NEXIUM_UPSTREAM_TIMEOUT_SECS must be a number".to_string())?;

        let rate_limit: u32 = env_or("NEXIUM_RATE_LIMIT", "100")
            .parse()
            .map_err(|_| "NEXIUM_RATE_LIMIT must be a number".to_string())?;

        let rate_window_secs: u64 = env_or("NEXIUM_RATE_WINDOW_SECS", "60")
            .parse()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| "NEXIUM_RATE_WINDOW_SECS must be a positive number".to_string())?;

        let refresh_interval_secs: u64 = env_or("NEXIUM_REFRESH_INTERVAL_SECS", "300")
            .parse()
            .map_err(|_| "NEXIUM_REFRESH_INTERVAL_SECS must be a number".to_string())?;

        let webhooks = parse_webhooks(&std::env::var("NEXIUM_WEBHOOKS").unwrap_or_default())?;

        let cors_origins: Vec<String> = std::env::var("NEXIUM_CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            port,
            data_dir,
            profile_api_url,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs),
            rate_limit,
            rate_window_secs,
            refresh_interval_secs,
            webhooks,
            cors_origins,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse `name=url` pairs from a comma-separated list. Route names are
/// mounted under `/api/`, so they must be single path segments.
fn parse_webhooks(raw: &str) -> Result<Vec<WebhookRoute>, String> {
    let mut routes = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, url) = entry
            .split_once('=')
            .ok_or_else(|| format!("invalid webhook entry '{entry}', expected name=url"))?;

        let name = name.trim().trim_start_matches('/');
        let url = url.trim();

        if name.is_empty() || name.contains('/') {
            return Err(format!("invalid webhook name '{name}'"));
        }
        if url.is_empty() {
            return Err(format!("webhook '{name}' has an empty destination URL"));
        }

        routes.push(WebhookRoute {
            name: name.to_string(),
            url: url.to_string(),
        });
    }

    Ok(routes)
}
