/// Default site coordinates (Nangang, Taipei).
const DEFAULT_LATITUDE: f64 = 25.04294;
const DEFAULT_LONGITUDE: f64 = 121.61377;

/// Default OpenRouter models, tried in order.
const DEFAULT_AI_MODELS: &str = "nvidia/nemotron-3-nano-30b-a3b:free,google/gemini-3-flash-preview";

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Optional PostgreSQL store. When unset, state lives in process memory.
    pub database_url: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Plant-local offset from UTC, used for reminders, tariffs and forecast alignment.
    pub utc_offset_hours: i32,
    /// IANA zone name sent to Open-Meteo so hourly times are plant-local.
    pub timezone: String,
    pub user_agent: String,

    pub open_meteo_url: String,
    pub cwa_url: String,
    pub cwa_api_key: Option<String>,
    pub cwa_station_id: String,
    pub wttr_url: String,
    /// Relay that fetches `?url=<target>` on our behalf.
    pub cors_relay_url: Option<String>,

    pub openrouter_url: String,
    pub openrouter_api_key: Option<String>,
    pub ai_models: Vec<String>,

    pub notify_webhook_url: Option<String>,
    pub background_scheduler: bool,
    pub background_wake_secs: u64,
    pub forecast_refresh_secs: u64,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Interval settings drive `tokio::time::interval`, which rejects zero.
fn positive_secs(name: &str, raw: &str) -> u64 {
    raw.parse::<u64>()
        .ok()
        .filter(|s| *s > 0)
        .unwrap_or_else(|| panic!("{} must be a positive number of seconds", name))
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", "8080")
                .parse()
                .expect("PORT must be a valid u16"),
            database_url: env_opt("DATABASE_URL"),
            latitude: env_or("SITE_LATITUDE", &DEFAULT_LATITUDE.to_string())
                .parse()
                .expect("SITE_LATITUDE must be a number"),
            longitude: env_or("SITE_LONGITUDE", &DEFAULT_LONGITUDE.to_string())
                .parse()
                .expect("SITE_LONGITUDE must be a number"),
            utc_offset_hours: env_or("UTC_OFFSET_HOURS", "8")
                .parse()
                .expect("UTC_OFFSET_HOURS must be an integer"),
            timezone: env_or("SITE_TIMEZONE", "Asia/Taipei"),
            user_agent: env_or(
                "HTTP_USER_AGENT",
                concat!("ChillerAdvisor/", env!("CARGO_PKG_VERSION")),
            ),
            open_meteo_url: env_or(
                "OPEN_METEO_URL",
                "https://api.open-meteo.com/v1/forecast",
            ),
            cwa_url: env_or(
                "CWA_URL",
                "https://opendata.cwa.gov.tw/api/v1/rest/datastore/O-A0003-001",
            ),
            cwa_api_key: env_opt("CWA_API_KEY"),
            cwa_station_id: env_or("CWA_STATION_ID", "466920"),
            wttr_url: env_or("WTTR_URL", "https://wttr.in"),
            cors_relay_url: env_opt("CORS_RELAY_URL"),
            openrouter_url: env_or(
                "OPENROUTER_URL",
                "https://openrouter.ai/api/v1/chat/completions",
            ),
            openrouter_api_key: env_opt("OPENROUTER_API_KEY"),
            ai_models: env_or("AI_MODELS", DEFAULT_AI_MODELS)
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
            notify_webhook_url: env_opt("NOTIFY_WEBHOOK_URL"),
            background_scheduler: env_or("BACKGROUND_SCHEDULER", "true")
                .parse()
                .unwrap_or(true),
            background_wake_secs: positive_secs(
                "BACKGROUND_WAKE_SECS",
                &env_or("BACKGROUND_WAKE_SECS", "240"),
            ),
            forecast_refresh_secs: positive_secs(
                "FORECAST_REFRESH_SECS",
                &env_or("FORECAST_REFRESH_SECS", "1800"),
            ),
        }
    }

    /// Plant-local fixed offset.
    pub fn local_offset(&self) -> chrono::FixedOffset {
        use chrono::Offset;
        chrono::FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| {
            tracing::warn!(
                "UTC offset {}h out of range, falling back to UTC",
                self.utc_offset_hours
            );
            chrono::Utc.fix()
        })
    }
}
