//! Chiller load analysis.
//!
//! A request always gets the rule-based part (load rate, band recommendation,
//! best chiller combinations). When an API key is available the same figures
//! are sent to the language model for a written assessment; successful AI
//! results are cached for 30 minutes and appended to the analysis history.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::helpers::round_1dp;
use crate::services::ai::{self, AiCompletion, AiError, ChatCompletion};
use crate::services::pricing::{self, HourlyPrice, Tariff};
use crate::services::rules::{Recommendation, RuleBand};
use crate::services::sources::{ForecastSeries, WeatherSample};
use crate::services::store::{self, KeyValueStore, SharedStore, StoreError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const ANALYSIS_HISTORY_KEY: &str = "ai_analysis_history";
pub const API_KEY_SETTING: &str = "openrouter_key";

/// Maximum number of history entries kept, newest first.
pub const MAX_HISTORY_ITEMS: usize = 50;

/// Suggestions are truncated to this many characters in the history.
pub const HISTORY_SUGGESTION_CHARS: usize = 200;

/// How long a cached AI analysis stays valid.
pub const CACHE_TTL_MINUTES: i64 = 30;

/// Configurations returned per request.
const MAX_CONFIGS: usize = 3;

/// Forecast points (current hour included) quoted in the prompt.
const PROMPT_FORECAST_POINTS: usize = 7;

/// Tariff hours quoted in the prompt.
const PROMPT_PRICING_HOURS: u32 = 6;

// ---------------------------------------------------------------------------
// Chiller fleet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChillerSize {
    Large,
    Small,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChillerSpec {
    pub id: &'static str,
    pub size: ChillerSize,
    pub capacity_rt: u32,
    pub cop: f64,
    pub rated_kw: f64,
}

const fn large(id: &'static str) -> ChillerSpec {
    ChillerSpec {
        id,
        size: ChillerSize::Large,
        capacity_rt: 715,
        cop: 6.1,
        rated_kw: 412.0,
    }
}

const fn small(id: &'static str) -> ChillerSpec {
    ChillerSpec {
        id,
        size: ChillerSize::Small,
        capacity_rt: 270,
        cop: 4.9,
        rated_kw: 194.0,
    }
}

pub const FLEET: [ChillerSpec; 5] = [
    large("CHU-G01"),
    large("CHU-G02"),
    large("CHU-G03"),
    small("CHU-G04"),
    small("CHU-G05"),
];

pub const LARGE_CAPACITY_RT: u32 = 715;
pub const SMALL_CAPACITY_RT: u32 = 270;
pub const LARGE_COUNT: u32 = 3;
pub const SMALL_COUNT: u32 = 2;
pub const TOTAL_CAPACITY_RT: u32 = LARGE_COUNT * LARGE_CAPACITY_RT + SMALL_COUNT * SMALL_CAPACITY_RT;

pub fn chiller_by_id(id: &str) -> Option<&'static ChillerSpec> {
    FLEET.iter().find(|c| c.id.eq_ignore_ascii_case(id.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Efficiency {
    /// Load rate within 50-85%
    Optimal,
    Low,
    High,
}

impl Efficiency {
    fn of(load_rate_pct: f64) -> Self {
        if load_rate_pct < 50.0 {
            Efficiency::Low
        } else if load_rate_pct <= 85.0 {
            Efficiency::Optimal
        } else {
            Efficiency::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChillerConfig {
    pub large: u32,
    pub small: u32,
    pub capacity_rt: u32,
    pub load_rate_pct: f64,
    pub efficiency: Efficiency,
    /// Combined rated power of the combination
    pub rated_kw: f64,
}

/// Smallest combinations able to carry `load_rt`, ordered by capacity.
pub fn optimal_configs(load_rt: f64) -> Vec<ChillerConfig> {
    let mut configs = Vec::new();
    for l in 0..=LARGE_COUNT {
        for s in 0..=SMALL_COUNT {
            if l == 0 && s == 0 {
                continue;
            }
            let capacity = l * LARGE_CAPACITY_RT + s * SMALL_CAPACITY_RT;
            if f64::from(capacity) < load_rt {
                continue;
            }
            let load_rate = round_1dp(load_rt / f64::from(capacity) * 100.0);
            configs.push(ChillerConfig {
                large: l,
                small: s,
                capacity_rt: capacity,
                load_rate_pct: load_rate,
                efficiency: Efficiency::of(load_rate),
                rated_kw: f64::from(l) * 412.0 + f64::from(s) * 194.0,
            });
        }
    }
    configs.sort_by_key(|c| c.capacity_rt);
    configs.truncate(MAX_CONFIGS);
    configs
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AnalysisRequest {
    /// Current cooling load in refrigeration tons
    pub load_rt: f64,
    /// Ids of the chillers currently running, e.g. "CHU-G01"
    #[serde(default)]
    pub running_chillers: Vec<String>,
    pub supply_temp_c: Option<f64>,
    pub return_temp_c: Option<f64>,
}

impl AnalysisRequest {
    fn validate(&self) -> Result<Vec<&'static ChillerSpec>, AppError> {
        if !self.load_rt.is_finite() || self.load_rt <= 0.0 {
            return Err(AppError::BadRequest(
                "load_rt must be a positive number".to_string(),
            ));
        }
        for t in [self.supply_temp_c, self.return_temp_c].into_iter().flatten() {
            if !t.is_finite() {
                return Err(AppError::BadRequest(
                    "chilled-water temperatures must be finite".to_string(),
                ));
            }
        }
        self.running_chillers
            .iter()
            .map(|id| {
                chiller_by_id(id)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown chiller '{}'", id)))
            })
            .collect()
    }
}

/// AI failure reported alongside an otherwise successful analysis.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AiFailure {
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalysisResult {
    pub enthalpy: f64,
    pub load_rt: f64,
    /// Load as a share of the whole fleet
    pub load_rate_pct: f64,
    pub running_capacity_rt: u32,
    /// Load as a share of the running chillers, if any run
    pub running_load_rate_pct: Option<f64>,
    pub recommendation: Recommendation,
    pub configs: Vec<ChillerConfig>,
    pub tariff: Tariff,
    /// Cost of one hour at the first configuration's rated power
    #[schema(value_type = Option<String>)]
    pub hourly_cost: Option<Decimal>,
    pub ai: Option<AiCompletion>,
    pub ai_error: Option<AiFailure>,
    /// Served from the 30-minute cache
    pub cached: bool,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Cache key: enthalpy to the nearest unit, load to the nearest ten tons.
pub fn cache_key(enthalpy: f64, load_rt: f64) -> String {
    let e = enthalpy.round() as i64;
    let l = ((load_rt / 10.0).round() * 10.0) as i64;
    format!("{}-{}", e, l)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: AnalysisResult,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: HashMap<String, CacheEntry>,
}

impl AnalysisCache {
    fn ttl() -> Duration {
        Duration::minutes(CACHE_TTL_MINUTES)
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<&AnalysisResult> {
        self.entries
            .get(key)
            .filter(|e| now - e.stored_at < Self::ttl())
            .map(|e| &e.result)
    }

    /// Insert and drop every expired entry.
    pub fn insert(&mut self, key: String, result: AnalysisResult, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            CacheEntry {
                result,
                stored_at: now,
            },
        );
        self.entries.retain(|_, e| now - e.stored_at <= Self::ttl());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisHistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub enthalpy: f64,
    #[serde(rename = "loadRT")]
    pub load_rt: f64,
    pub suggestion: String,
    pub model: String,
}

pub async fn load_history(
    store: &dyn KeyValueStore,
) -> Result<Vec<AnalysisHistoryEntry>, StoreError> {
    store::get_json(store, ANALYSIS_HISTORY_KEY).await
}

pub async fn append_history(
    store: &dyn KeyValueStore,
    enthalpy: f64,
    load_rt: f64,
    completion: &AiCompletion,
) -> Result<AnalysisHistoryEntry, StoreError> {
    let mut history = load_history(store).await?;
    let entry = AnalysisHistoryEntry {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        enthalpy,
        load_rt,
        suggestion: completion
            .content
            .chars()
            .take(HISTORY_SUGGESTION_CHARS)
            .collect(),
        model: completion.model.clone(),
    };
    history.insert(0, entry.clone());
    history.truncate(MAX_HISTORY_ITEMS);
    store::set_json(store, ANALYSIS_HISTORY_KEY, &history).await?;
    tracing::debug!("Saved analysis history entry {}", entry.id);
    Ok(entry)
}

pub async fn clear_history(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.delete(ANALYSIS_HISTORY_KEY).await
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

pub struct PromptContext<'a> {
    pub request: &'a AnalysisRequest,
    pub weather: &'a WeatherSample,
    pub forecast: Option<&'a ForecastSeries>,
    pub tariff: &'a Tariff,
    pub upcoming_prices: &'a [HourlyPrice],
    pub load_rate_pct: f64,
    pub running_capacity_rt: u32,
    pub recommended: Option<&'a ChillerConfig>,
}

pub fn build_prompt(ctx: &PromptContext<'_>) -> String {
    let req = ctx.request;
    let running = if req.running_chillers.is_empty() {
        "none (all stopped)".to_string()
    } else {
        req.running_chillers
            .iter()
            .filter_map(|id| chiller_by_id(id))
            .map(|c| match c.size {
                ChillerSize::Large => format!("{} (large)", c.id),
                ChillerSize::Small => format!("{} (small)", c.id),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    let running_rate = if ctx.running_capacity_rt > 0 {
        round_1dp(req.load_rt / f64::from(ctx.running_capacity_rt) * 100.0)
    } else {
        0.0
    };
    let temps = match (req.supply_temp_c, req.return_temp_c) {
        (Some(s), Some(r)) => format!(
            "- Chilled-water supply: {}°C\n- Chilled-water return: {}°C\n- Supply/return delta: {:.1}°C",
            s,
            r,
            r - s
        ),
        _ => "- Chilled-water temperatures: not provided".to_string(),
    };
    let forecast = match ctx.forecast {
        Some(series) => series
            .points()
            .iter()
            .take(PROMPT_FORECAST_POINTS)
            .map(|p| format!("+{}h: {:.1}", p.hours_from_now(), p.enthalpy()))
            .collect::<Vec<_>>()
            .join(", "),
        None => "no forecast available".to_string(),
    };
    let prices = if ctx.upcoming_prices.is_empty() {
        "no data".to_string()
    } else {
        ctx.upcoming_prices
            .iter()
            .map(|p| format!("{:02}:00 {:?} {}", p.hour, p.tier, p.price))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let recommended = match ctx.recommended {
        Some(c) => format!(
            "{} large + {} small ({} RT)",
            c.large, c.small, c.capacity_rt
        ),
        None => format!("load exceeds total capacity of {} RT", TOTAL_CAPACITY_RT),
    };

    format!(
        "You are an expert in chilled-water plant operation. Analyse the following data.\n\n\
         [Fleet]\n\
         - Large chillers CHU-G01, G02, G03: 715 RT each, rated COP 6.1, rated power 412 kW\n\
         - Small chillers CHU-G04, G05: 270 RT each, rated COP 4.9, rated power 194 kW\n\
         - Total capacity: {total} RT\n\n\
         [Current operation]\n\
         - Running chillers: {running}\n\
         - Running capacity: {running_cap} RT\n\
         - Current load: {load} RT (load rate {rate}%)\n\
         - Running efficiency: {running_rate}%\n\
         {temps}\n\n\
         [Outdoor conditions]\n\
         - Enthalpy: {enthalpy} kJ/kg\n\
         - Temperature: {temp}°C\n\
         - Humidity: {hum}%\n\n\
         [Electricity pricing]\n\
         - Current period: {tier:?} ({season:?}, {day_type:?})\n\
         - Current price: {price} NT$/kWh\n\
         - Next {hours} hours: {prices}\n\n\
         [Enthalpy forecast]\n\
         {forecast}\n\n\
         [Computed recommendation]\n\
         - Suggested combination: {recommended}\n\n\
         Please cover:\n\
         1. Current assessment: is the running combination appropriate and efficient?\n\
         2. Adjustments: which chillers to start, stop or swap\n\
         3. Energy saving: chilled-water delta and load match\n\
         4. Cost: how to reduce the electricity bill given the tariff periods\n\
         5. Trend: when to change strategy based on the enthalpy forecast\n\n\
         Answer concisely and professionally.",
        total = TOTAL_CAPACITY_RT,
        running = running,
        running_cap = ctx.running_capacity_rt,
        load = req.load_rt,
        rate = ctx.load_rate_pct,
        running_rate = running_rate,
        temps = temps,
        enthalpy = ctx.weather.enthalpy(),
        temp = ctx.weather.temperature_c(),
        hum = ctx.weather.relative_humidity_pct(),
        tier = ctx.tariff.tier,
        season = ctx.tariff.season,
        day_type = ctx.tariff.day_type,
        price = ctx.tariff.price,
        hours = PROMPT_PRICING_HOURS,
        prices = prices,
        forecast = forecast,
        recommended = recommended,
    )
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct AnalysisService {
    chat: Arc<dyn ChatCompletion>,
    models: Vec<String>,
    store: SharedStore,
    configured_key: Option<String>,
    cache: Mutex<AnalysisCache>,
}

impl AnalysisService {
    pub fn new(
        chat: Arc<dyn ChatCompletion>,
        models: Vec<String>,
        store: SharedStore,
        configured_key: Option<String>,
    ) -> Self {
        Self {
            chat,
            models,
            store,
            configured_key,
            cache: Mutex::new(AnalysisCache::default()),
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Stored key if one was set at runtime, else the configured one.
    pub async fn api_key(&self) -> Result<Option<String>, StoreError> {
        let stored = self
            .store
            .get(API_KEY_SETTING)
            .await?
            .filter(|k| !k.trim().is_empty());
        Ok(stored.or_else(|| self.configured_key.clone()))
    }

    pub async fn set_api_key(&self, key: &str) -> Result<(), AppError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::BadRequest("API key must not be empty".to_string()));
        }
        self.store.set(API_KEY_SETTING, key).await?;
        tracing::info!("OpenRouter API key updated");
        Ok(())
    }

    pub async fn clear_api_key(&self) -> Result<(), StoreError> {
        self.store.delete(API_KEY_SETTING).await
    }

    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        weather: &WeatherSample,
        forecast: Option<&ForecastSeries>,
        local_now: NaiveDateTime,
    ) -> Result<AnalysisResult, AppError> {
        let running = request.validate()?;
        let now = Utc::now();
        let key = cache_key(weather.enthalpy(), request.load_rt);

        if let Some(hit) = self.cache.lock().await.get(&key, now) {
            tracing::debug!("Analysis cache hit for {}", key);
            let mut result = hit.clone();
            result.cached = true;
            return Ok(result);
        }

        let load_rate_pct = round_1dp(request.load_rt / f64::from(TOTAL_CAPACITY_RT) * 100.0);
        let running_capacity_rt: u32 = running.iter().map(|c| c.capacity_rt).sum();
        let configs = optimal_configs(request.load_rt);
        let tariff = pricing::current_tariff(local_now);
        let upcoming = pricing::hourly_preview(local_now, PROMPT_PRICING_HOURS);

        let mut result = AnalysisResult {
            enthalpy: weather.enthalpy(),
            load_rt: request.load_rt,
            load_rate_pct,
            running_capacity_rt,
            running_load_rate_pct: (running_capacity_rt > 0).then(|| {
                round_1dp(request.load_rt / f64::from(running_capacity_rt) * 100.0)
            }),
            recommendation: RuleBand::classify(weather.enthalpy()).recommendation(),
            configs,
            hourly_cost: None,
            tariff,
            ai: None,
            ai_error: None,
            cached: false,
            generated_at: now,
        };
        result.hourly_cost = result
            .configs
            .first()
            .map(|c| pricing::running_cost(c.rated_kw, 1.0, result.tariff.price));

        let api_key = self.api_key().await?;
        if api_key.is_none() {
            return Ok(result);
        }

        let prompt = build_prompt(&PromptContext {
            request,
            weather,
            forecast,
            tariff: &result.tariff,
            upcoming_prices: &upcoming,
            load_rate_pct,
            running_capacity_rt,
            recommended: result.configs.first(),
        });

        match ai::run_with_fallback(self.chat.as_ref(), api_key.as_deref(), &self.models, &prompt)
            .await
        {
            Ok(completion) => {
                append_history(self.store.as_ref(), weather.enthalpy(), request.load_rt, &completion)
                    .await?;
                result.ai = Some(completion);
                self.cache.lock().await.insert(key, result.clone(), now);
            }
            Err(e) => {
                tracing::warn!("AI analysis failed: {}", e);
                result.ai_error = Some(AiFailure {
                    retryable: matches!(e, AiError::Exhausted(_)),
                    message: e.to_string(),
                });
            }
        }
        Ok(result)
    }
}
