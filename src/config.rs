use clap::Parser;

use crate::proxy::parse_proxy_list;

/// Shared configuration for all scrape jobs, sourced from flags or the
/// environment.
#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchfeed.db")]
    pub database_path: String,

    /// Platform request id recorded on the scraper run row
    #[arg(long, env = "REQUEST_ID")]
    pub request_id: Option<String>,

    /// How many days ahead the fixtures job looks
    #[arg(long, env = "FIXTURE_DAYS", default_value = "7")]
    pub fixture_days: u32,

    /// How far ahead (hours) the odds job loads upcoming events
    #[arg(long, env = "ODDS_WINDOW_HOURS", default_value = "48")]
    pub odds_window_hours: i64,

    // ── Proxy providers, cheapest tier first ────────────────────────────────
    /// DataImpulse residential gateway (~$1/GB)
    #[arg(long, env = "DATAIMPULSE_USERNAME")]
    pub dataimpulse_username: Option<String>,

    #[arg(long, env = "DATAIMPULSE_PASSWORD")]
    pub dataimpulse_password: Option<String>,

    /// IPRoyal residential gateway (~$1.75/GB)
    #[arg(long, env = "IPROYAL_USERNAME")]
    pub iproyal_username: Option<String>,

    #[arg(long, env = "IPROYAL_PASSWORD")]
    pub iproyal_password: Option<String>,

    /// PacketStream API key (free-tier managed)
    #[arg(long, env = "PACKETSTREAM_API_KEY")]
    pub packetstream_api_key: Option<String>,

    /// ScraperAPI key (managed API with a monthly request quota)
    #[arg(long, env = "SCRAPERAPI_KEY")]
    pub scraperapi_key: Option<String>,

    /// Monthly request budget for ScraperAPI
    #[arg(long, env = "SCRAPERAPI_LIMIT", default_value = "1000")]
    pub scraperapi_limit: u32,

    #[arg(long, env = "SMARTPROXY_USERNAME")]
    pub smartproxy_username: Option<String>,

    #[arg(long, env = "SMARTPROXY_PASSWORD")]
    pub smartproxy_password: Option<String>,

    #[arg(long, env = "OXYLABS_USERNAME")]
    pub oxylabs_username: Option<String>,

    #[arg(long, env = "OXYLABS_PASSWORD")]
    pub oxylabs_password: Option<String>,

    /// BrightData residential zone ($6-17/GB, last resort)
    #[arg(long, env = "BRIGHTDATA_USERNAME")]
    pub brightdata_username: Option<String>,

    #[arg(long, env = "BRIGHTDATA_PASSWORD")]
    pub brightdata_password: Option<String>,

    /// Static proxies: comma-separated "server|user|pass" entries
    #[arg(long, env = "PROXY_LIST")]
    pub proxy_list: Option<String>,

    /// ISO-3166-1 alpha-2 country pin for residential exits
    #[arg(long, env = "PROXY_COUNTRY", default_value = "gb")]
    pub proxy_country: String,

    // ── CAPTCHA solving (keys only; solver adapters live elsewhere) ─────────
    #[arg(long, env = "CAPTCHA_ENABLED", default_value = "false")]
    pub captcha_enabled: bool,

    #[arg(long, env = "TWOCAPTCHA_API_KEY")]
    pub twocaptcha_api_key: Option<String>,

    #[arg(long, env = "ANTICAPTCHA_API_KEY")]
    pub anticaptcha_api_key: Option<String>,

    #[arg(long, env = "CAPMONSTER_API_KEY")]
    pub capmonster_api_key: Option<String>,

    /// Destination for finished-match settlement messages
    #[arg(long, env = "SETTLEMENT_QUEUE_URL")]
    pub settlement_queue_url: Option<String>,

    /// Log filter when RUST_LOG is not set (DEBUG/INFO/WARN/ERROR)
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.proxy_country.len() != 2
            || !self.proxy_country.chars().all(|c| c.is_ascii_alphabetic())
        {
            anyhow::bail!("PROXY_COUNTRY must be an ISO-3166-1 alpha-2 code");
        }
        if self.dataimpulse_username.is_some() != self.dataimpulse_password.is_some() {
            anyhow::bail!("DATAIMPULSE_USERNAME and DATAIMPULSE_PASSWORD must be set together");
        }
        if self.iproyal_username.is_some() != self.iproyal_password.is_some() {
            anyhow::bail!("IPROYAL_USERNAME and IPROYAL_PASSWORD must be set together");
        }
        if self.smartproxy_username.is_some() != self.smartproxy_password.is_some() {
            anyhow::bail!("SMARTPROXY_USERNAME and SMARTPROXY_PASSWORD must be set together");
        }
        if self.oxylabs_username.is_some() != self.oxylabs_password.is_some() {
            anyhow::bail!("OXYLABS_USERNAME and OXYLABS_PASSWORD must be set together");
        }
        if self.brightdata_username.is_some() != self.brightdata_password.is_some() {
            anyhow::bail!("BRIGHTDATA_USERNAME and BRIGHTDATA_PASSWORD must be set together");
        }
        if self.scraperapi_key.is_some() && self.scraperapi_limit == 0 {
            anyhow::bail!("SCRAPERAPI_LIMIT must be positive");
        }
        if let Some(list) = &self.proxy_list {
            if parse_proxy_list(list).is_empty() {
                anyhow::bail!("PROXY_LIST is set but contains no parsable entries");
            }
        }
        if self.captcha_enabled
            && self.twocaptcha_api_key.is_none()
            && self.anticaptcha_api_key.is_none()
            && self.capmonster_api_key.is_none()
        {
            anyhow::bail!("CAPTCHA_ENABLED requires at least one solver API key");
        }
        if self.fixture_days == 0 || self.fixture_days > 30 {
            anyhow::bail!("fixture_days must be between 1 and 30");
        }
        if self.odds_window_hours <= 0 || self.odds_window_hours > 24 * 14 {
            anyhow::bail!("odds_window_hours must be between 1 and 336");
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn default_for_tests() -> Self {
        Config::parse_from(["matchfeed"])
    }
}
