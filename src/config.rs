//! Application configuration.
//!
//! Screener settings come from an optional JSON file named by
//! `VOLSCAN_CONFIG`; every field has a default. A few environment variables
//! override the file:
//! - `VOLSCAN_WATCH_SYMBOLS`: comma-separated tickers
//! - `VOLSCAN_REFRESH_SECS`: refresh interval in seconds
//! - `VOLSCAN_IV_THRESHOLD`: fixed IV threshold
//!
//! The market data source is Yahoo Finance unless `VOLSCAN_FIXTURE` names a
//! JSON fixture file. `VOLSCAN_YAHOO_URL` overrides the Yahoo base URL.
//!
//! Any validation failure is fatal and surfaces before the scheduler starts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::VolscanError;
use crate::classifier::{IvRegimePolicy, TrailingReference};
use crate::indicators::IndicatorSettings;
use crate::models::normalize_symbol;

/// Default Yahoo Finance API host.
pub const DEFAULT_YAHOO_URL: &str = "https://query1.finance.yahoo.com";

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub screener: ScreenerConfig,
    pub source: DataSource,
}

/// Where market data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Yahoo { base_url: String },
    Fixture { path: PathBuf },
}

/// Screening parameters. Unknown keys in the JSON file are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenerConfig {
    pub band_period: usize,
    pub band_multiplier: f64,
    pub refresh_interval_seconds: u64,
    pub iv_threshold: f64,
    pub watch_symbols: Vec<String>,
    /// Budget for all gateway calls of one symbol within a cycle.
    pub fetch_timeout_seconds: u64,
    /// Symbols evaluated concurrently within a cycle.
    pub max_concurrent_symbols: usize,
    /// Enables the trailing IV reference with this many samples.
    pub iv_trailing_window: Option<usize>,
    pub iv_trailing_ratio: f64,
    /// Rate used when the gateway cannot provide one.
    pub fallback_risk_free_rate: f64,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    /// Volatility used to price the strike ladder when IV is unknown.
    pub ladder_fallback_volatility: f64,
    /// Nearest option expiry the live gateway will pick, in days.
    pub min_days_to_expiry: u32,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            band_period: 20,
            band_multiplier: 2.0,
            refresh_interval_seconds: 30,
            iv_threshold: 0.35,
            watch_symbols: Vec::new(),
            fetch_timeout_seconds: 5,
            max_concurrent_symbols: 4,
            iv_trailing_window: None,
            iv_trailing_ratio: 1.2,
            fallback_risk_free_rate: 0.01,
            ema_fast_period: 9,
            ema_slow_period: 20,
            ladder_fallback_volatility: 0.2,
            min_days_to_expiry: 7,
        }
    }
}

impl ScreenerConfig {
    /// Loads screener settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. The result is
    /// not validated; call [`validate`](Self::validate).
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VolscanError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Checks every option against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`VolscanError::Config`] describing the first invalid option.
    pub fn validate(&self) -> crate::Result<()> {
        if self.band_period == 0 {
            return Err(config_error("band_period must be greater than zero"));
        }
        if !(self.band_multiplier.is_finite() && self.band_multiplier > 0.0) {
            return Err(config_error(format!(
                "band_multiplier must be positive, got {}",
                self.band_multiplier
            )));
        }
        if self.refresh_interval_seconds == 0 {
            return Err(config_error(
                "refresh_interval_seconds must be greater than zero",
            ));
        }
        if !(self.iv_threshold.is_finite() && self.iv_threshold > 0.0) {
            return Err(config_error(format!(
                "iv_threshold must be positive, got {}",
                self.iv_threshold
            )));
        }
        if self.watch_symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(config_error("watch_symbols contains a blank symbol"));
        }
        if self.symbols().is_empty() {
            return Err(config_error("watch list is empty"));
        }
        if self.fetch_timeout_seconds == 0 {
            return Err(config_error("fetch_timeout_seconds must be greater than zero"));
        }
        if self.fetch_timeout_seconds >= self.refresh_interval_seconds {
            return Err(config_error(format!(
                "fetch_timeout_seconds ({}) must be shorter than refresh_interval_seconds ({})",
                self.fetch_timeout_seconds, self.refresh_interval_seconds
            )));
        }
        if self.max_concurrent_symbols == 0 {
            return Err(config_error(
                "max_concurrent_symbols must be greater than zero",
            ));
        }
        if self.iv_trailing_window == Some(0) {
            return Err(config_error("iv_trailing_window must be greater than zero"));
        }
        if !(self.iv_trailing_ratio.is_finite() && self.iv_trailing_ratio > 0.0) {
            return Err(config_error(format!(
                "iv_trailing_ratio must be positive, got {}",
                self.iv_trailing_ratio
            )));
        }
        if !self.fallback_risk_free_rate.is_finite() {
            return Err(config_error("fallback_risk_free_rate must be finite"));
        }
        if self.ema_fast_period == 0 || self.ema_slow_period == 0 {
            return Err(config_error("EMA periods must be greater than zero"));
        }
        if !(self.ladder_fallback_volatility.is_finite() && self.ladder_fallback_volatility > 0.0)
        {
            return Err(config_error(format!(
                "ladder_fallback_volatility must be positive, got {}",
                self.ladder_fallback_volatility
            )));
        }
        Ok(())
    }

    /// Normalised, de-duplicated watch symbols.
    pub fn symbols(&self) -> BTreeSet<String> {
        self.watch_symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn indicator_settings(&self) -> IndicatorSettings {
        IndicatorSettings {
            band_period: self.band_period,
            band_multiplier: self.band_multiplier,
            ema_fast_span: self.ema_fast_period,
            ema_slow_span: self.ema_slow_period,
        }
    }

    pub fn iv_policy(&self) -> IvRegimePolicy {
        IvRegimePolicy {
            threshold: self.iv_threshold,
            trailing: self.iv_trailing_window.map(|window| TrailingReference {
                window,
                ratio: self.iv_trailing_ratio,
            }),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Loads and validates the application configuration.
///
/// # Errors
///
/// Returns [`VolscanError::Config`] if the config file is unreadable, an
/// override does not parse, or validation fails.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let mut screener = match non_empty_var("VOLSCAN_CONFIG") {
        Some(path) => ScreenerConfig::load(Path::new(&path))?,
        None => ScreenerConfig::default(),
    };

    if let Some(symbols) = non_empty_var("VOLSCAN_WATCH_SYMBOLS") {
        screener.watch_symbols = symbols.split(',').map(str::to_string).collect();
    }
    if let Some(secs) = non_empty_var("VOLSCAN_REFRESH_SECS") {
        screener.refresh_interval_seconds = secs.trim().parse().map_err(|e| {
            config_error(format!("VOLSCAN_REFRESH_SECS is not an integer: {e}"))
        })?;
    }
    if let Some(threshold) = non_empty_var("VOLSCAN_IV_THRESHOLD") {
        screener.iv_threshold = threshold.trim().parse().map_err(|e| {
            config_error(format!("VOLSCAN_IV_THRESHOLD is not a number: {e}"))
        })?;
    }

    screener.validate()?;

    let source = match non_empty_var("VOLSCAN_FIXTURE") {
        Some(path) => DataSource::Fixture {
            path: PathBuf::from(path),
        },
        None => DataSource::Yahoo {
            base_url: non_empty_var("VOLSCAN_YAHOO_URL")
                .unwrap_or_else(|| DEFAULT_YAHOO_URL.to_string()),
        },
    };

    Ok(AppConfig { screener, source })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn config_error(message: impl Into<String>) -> VolscanError {
    VolscanError::Config(message.into())
}
