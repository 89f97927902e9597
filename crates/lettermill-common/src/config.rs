//! Configuration for Lettermill

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Outbound SMTP transport configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Delivery pipeline configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Provider webhook configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Statistics aggregation configuration
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname used in generated headers and unsubscribe links
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// API bind address
    #[serde(default = "default_api_bind")]
    pub api_bind: String,

    /// Base URL for unsubscribe links embedded in rendered content
    #[serde(default = "default_unsubscribe_base_url")]
    pub unsubscribe_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            api_bind: default_api_bind(),
            unsubscribe_base_url: default_unsubscribe_base_url(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_unsubscribe_base_url() -> String {
    "http://localhost:8080/unsubscribe".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Outbound SMTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Relay username
    pub username: Option<String>,

    /// Relay password
    pub password: Option<String>,

    /// Use implicit TLS
    #[serde(default)]
    pub use_tls: bool,

    /// Use STARTTLS
    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,

    /// Send timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            use_tls: false,
            use_starttls: default_use_starttls(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_starttls() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Delivery pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Number of concurrent dispatch workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Queue items claimed per worker batch
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Seconds between worker polls of the queue
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Claim lease in seconds; items processing longer than this are
    /// considered abandoned and reclaimed
    #[serde(default = "default_lease")]
    pub lease_secs: i64,

    /// Maximum transient delivery attempts per queue item
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Retry backoff base in seconds
    #[serde(default = "default_retry_base")]
    pub retry_base_secs: i64,

    /// Retry backoff cap in seconds
    #[serde(default = "default_retry_cap")]
    pub retry_cap_secs: i64,

    /// Only enqueue verified subscribers
    #[serde(default = "default_require_verified")]
    pub require_verified: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            lease_secs: default_lease(),
            max_attempts: default_max_attempts(),
            retry_base_secs: default_retry_base(),
            retry_cap_secs: default_retry_cap(),
            require_verified: default_require_verified(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_batch_size() -> i64 {
    100
}

fn default_poll_interval() -> u64 {
    5
}

fn default_lease() -> i64 {
    300
}

fn default_max_attempts() -> i32 {
    5
}

fn default_retry_base() -> i64 {
    30
}

fn default_retry_cap() -> i64 {
    3600
}

fn default_require_verified() -> bool {
    true
}

/// Provider webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret used to verify provider signatures. The empty
    /// default rejects every webhook; set a secret before pointing the
    /// provider at this server.
    #[serde(default)]
    pub signing_secret: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
        }
    }
}

/// Statistics aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Seconds between rollup refreshes for active campaigns
    #[serde(default = "default_stats_interval")]
    pub refresh_interval_secs: u64,

    /// Engagement decay: points lost per day of inactivity
    #[serde(default = "default_engagement_decay")]
    pub engagement_decay_per_day: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_stats_interval(),
            engagement_decay_per_day: default_engagement_decay(),
        }
    }
}

fn default_stats_interval() -> u64 {
    60
}

fn default_engagement_decay() -> f64 {
    1.0
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/lettermill/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let delivery = DeliveryConfig::default();
        assert_eq!(delivery.worker_count, 4);
        assert_eq!(delivery.max_attempts, 5);
        assert_eq!(delivery.retry_base_secs, 30);
        assert_eq!(delivery.retry_cap_secs, 3600);

        let smtp = SmtpConfig::default();
        assert_eq!(smtp.port, 587);
        assert!(smtp.use_starttls);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "mail.example.com"
api_bind = "127.0.0.1:9090"

[database]
url = "postgres://localhost/lettermill"

[delivery]
worker_count = 8
lease_secs = 120

[webhook]
signing_secret = "s3cret"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "mail.example.com");
        assert_eq!(config.database.url, "postgres://localhost/lettermill");
        assert_eq!(config.delivery.worker_count, 8);
        assert_eq!(config.delivery.lease_secs, 120);
        assert_eq!(config.webhook.signing_secret, "s3cret");
        // untouched sections fall back to defaults
        assert_eq!(config.delivery.batch_size, 100);
        assert_eq!(config.smtp.port, 587);
    }
}
