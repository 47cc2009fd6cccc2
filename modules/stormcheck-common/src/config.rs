use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Upstream feeds
    pub alert_feed_url: String,
    pub report_feed_url: String,

    // Operation cadence (seconds)
    pub alert_poll_secs: u64,
    pub report_poll_secs: u64,
    pub verify_interval_secs: u64,

    // Correlation
    pub proximity_radius_miles: f64,
    pub recheck_horizon_hours: i64,
    /// JSON file mapping county/state pairs to administrative area codes.
    /// Exact-tier matching degrades to proximity-only when unset.
    pub area_index_path: Option<String>,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Admin
    pub admin_username: String,
    pub admin_password: String,

    // Notifications
    pub webhook_url: Option<String>,
    pub hail_notify_threshold_in: f64,
    pub wind_notify_threshold_mph: f64,

    // AI summaries (disabled when unset)
    pub anthropic_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            alert_feed_url: env::var("ALERT_FEED_URL")
                .unwrap_or_else(|_| "https://api.weather.gov".to_string()),
            report_feed_url: env::var("REPORT_FEED_URL")
                .unwrap_or_else(|_| "https://www.spc.noaa.gov/climo/reports".to_string()),
            alert_poll_secs: env_u64("ALERT_POLL_SECS", 300),
            report_poll_secs: env_u64("REPORT_POLL_SECS", 1800),
            verify_interval_secs: env_u64("VERIFY_INTERVAL_SECS", 900),
            proximity_radius_miles: env_f64("PROXIMITY_RADIUS_MILES", 25.0),
            recheck_horizon_hours: env_u64("RECHECK_HORIZON_HOURS", 72) as i64,
            area_index_path: env::var("AREA_INDEX_PATH").ok().filter(|v| !v.is_empty()),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password: required_env("ADMIN_PASSWORD"),
            webhook_url: env::var("WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            hail_notify_threshold_in: env_f64("HAIL_NOTIFY_THRESHOLD_IN", 1.0),
            wind_notify_threshold_mph: env_f64("WIND_NOTIFY_THRESHOLD_MPH", 58.0),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok().filter(|v| !v.is_empty()),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}
