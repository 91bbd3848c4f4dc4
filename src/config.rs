//! Service configuration, loaded from YAML.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Upper bound on the Sentry cache TTL (one week).
const MAX_SENTRY_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Population providers that can appear in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Geonames,
    Overpass,
    Worldpop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub exposure: ExposureConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub neo: NeoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_chain")]
    pub chain: Vec<ProviderKind>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on one provider call, including every request it makes.
    #[serde(default = "default_call_budget_secs")]
    pub call_budget_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub geonames: GeonamesConfig,
    #[serde(default)]
    pub overpass: OverpassConfig,
    #[serde(default)]
    pub worldpop: WorldpopConfig,
}

fn default_chain() -> Vec<ProviderKind> {
    vec![ProviderKind::Geonames, ProviderKind::Overpass]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_call_budget_secs() -> u64 {
    90
}

fn default_user_agent() -> String {
    concat!("impactscope/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            chain: default_chain(),
            timeout_secs: default_timeout_secs(),
            call_budget_secs: default_call_budget_secs(),
            user_agent: default_user_agent(),
            geonames: GeonamesConfig::default(),
            overpass: OverpassConfig::default(),
            worldpop: WorldpopConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeonamesConfig {
    /// Account name sent as the `username` credential. Unset disables the provider.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_geonames_url")]
    pub base_url: String,
    #[serde(default = "default_geonames_max_rows")]
    pub max_rows: u32,
}

fn default_geonames_url() -> String {
    "http://api.geonames.org/citiesJSON".to_string()
}

fn default_geonames_max_rows() -> u32 {
    1000
}

impl Default for GeonamesConfig {
    fn default() -> Self {
        Self {
            username: None,
            base_url: default_geonames_url(),
            max_rows: default_geonames_max_rows(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverpassConfig {
    #[serde(default = "default_overpass_url")]
    pub url: String,
    #[serde(default = "default_politeness_delay_ms")]
    pub politeness_delay_ms: u64,
    #[serde(default = "default_overpass_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_overpass_max_results")]
    pub max_results: u32,
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api/interpreter".to_string()
}

fn default_politeness_delay_ms() -> u64 {
    1200
}

fn default_overpass_query_timeout() -> u64 {
    25
}

fn default_overpass_max_results() -> u32 {
    2000
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            url: default_overpass_url(),
            politeness_delay_ms: default_politeness_delay_ms(),
            query_timeout_secs: default_overpass_query_timeout(),
            max_results: default_overpass_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldpopConfig {
    /// Image service root; the yearly layer name is appended.
    #[serde(default = "default_worldpop_url")]
    pub base_url: String,
    #[serde(default = "default_worldpop_year")]
    pub default_year: u16,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_grid")]
    pub grid: usize,
    #[serde(default = "default_retry_grid")]
    pub retry_grid: usize,
}

fn default_worldpop_url() -> String {
    "https://worldpop.arcgis.com/arcgis/rest/services".to_string()
}

fn default_worldpop_year() -> u16 {
    2020
}

fn default_batch_size() -> usize {
    180
}

fn default_grid() -> usize {
    21
}

fn default_retry_grid() -> usize {
    25
}

impl Default for WorldpopConfig {
    fn default() -> Self {
        Self {
            base_url: default_worldpop_url(),
            default_year: default_worldpop_year(),
            batch_size: default_batch_size(),
            grid: default_grid(),
            retry_grid: default_retry_grid(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureConfig {
    #[serde(default = "default_fatality_fraction")]
    pub fatality_fraction: f64,
}

fn default_fatality_fraction() -> f64 {
    0.35
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            fatality_fraction: default_fatality_fraction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sentry_ttl")]
    pub sentry_ttl_secs: u64,
    #[serde(default = "default_sentry_url")]
    pub sentry_url: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_sentry_ttl() -> u64 {
    6 * 60 * 60
}

fn default_sentry_url() -> String {
    "https://ssd-api.jpl.nasa.gov/sentry.api?all=1&removed=0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sentry_ttl_secs: default_sentry_ttl(),
            sentry_url: default_sentry_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeoConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_neo_url")]
    pub base_url: String,
}

fn default_neo_url() -> String {
    "https://api.nasa.gov/neo/rest/v1".to_string()
}

impl Default for NeoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_neo_url(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.chain.is_empty() {
            return Err(ConfigError::Validation(
                "provider chain must name at least one provider".into(),
            ));
        }
        if self.providers.timeout_secs == 0 || self.providers.call_budget_secs == 0 {
            return Err(ConfigError::Validation(
                "provider timeouts must be greater than zero".into(),
            ));
        }
        // the client must outlast the server-side query budget
        if self.providers.chain.contains(&ProviderKind::Overpass)
            && self.providers.timeout_secs <= self.providers.overpass.query_timeout_secs
        {
            return Err(ConfigError::Validation(format!(
                "timeout_secs ({}) must exceed overpass.query_timeout_secs ({})",
                self.providers.timeout_secs, self.providers.overpass.query_timeout_secs
            )));
        }
        if self.server.sentry_ttl_secs > MAX_SENTRY_TTL_SECS {
            return Err(ConfigError::Validation(format!(
                "server.sentry_ttl_secs must be at most {MAX_SENTRY_TTL_SECS}, got {}",
                self.server.sentry_ttl_secs
            )));
        }
        let worldpop = &self.providers.worldpop;
        if worldpop.batch_size == 0 {
            return Err(ConfigError::Validation(
                "worldpop batch size must be greater than zero".into(),
            ));
        }
        for grid in [worldpop.grid, worldpop.retry_grid] {
            if grid < 3 || grid % 2 == 0 {
                return Err(ConfigError::Validation(format!(
                    "grid resolution must be an odd number >= 3, got {grid}"
                )));
            }
        }
        let fraction = self.exposure.fatality_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ConfigError::Validation(format!(
                "fatality fraction must be within [0, 1], got {fraction}"
            )));
        }
        Ok(())
    }

    /// Fills credentials the binary received from flags or the environment.
    pub fn with_credentials(mut self, geonames_user: Option<String>, nasa_key: Option<String>) -> Self {
        if let Some(user) = geonames_user.filter(|u| !u.trim().is_empty()) {
            self.providers.geonames.username = Some(user);
        }
        if let Some(key) = nasa_key.filter(|k| !k.trim().is_empty()) {
            self.neo.api_key = Some(key);
        }
        self
    }
}
