//! Cache configuration: which precisions are cached, how their initialization
//! is tiled, and the ceilings enforced by the cacheability policy.
use crate::codec::MAX_PRECISION;
use serde::de::Error;
use serde::{Deserialize, Serialize};

/// Size of one initialization tile in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TileSize {
    pub lon_step: f64,
    pub lat_step: f64,
}

impl TileSize {
    pub const fn new(lon_step: f64, lat_step: f64) -> Self {
        Self { lon_step, lat_step }
    }

    /// One tile per hemisphere (east and west).
    pub const fn hemisphere() -> Self {
        Self::new(180.0, 180.0)
    }
}

/// Build plan for one cached precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrecisionPlan {
    pub precision: u8,
    pub tile: TileSize,
}

impl PrecisionPlan {
    pub const fn new(precision: u8, tile: TileSize) -> Self {
        Self { precision, tile }
    }
}

/// Aggregation cache configuration
///
/// # Example
///
/// ```rust
/// use gridcache::Config;
///
/// let config = Config::from_json(r#"{
///     "precisions": [
///         { "precision": 4, "tile": { "lon_step": 180.0, "lat_step": 180.0 } },
///         { "precision": 5, "tile": { "lon_step": 90.0, "lat_step": 45.0 } }
///     ],
///     "max_cached_precision": 5
/// }"#).unwrap();
/// assert_eq!(config.nested_terms_max_precision, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Precisions built by `initialize`, in build order.
    #[serde(default = "Config::default_precisions")]
    pub precisions: Vec<PrecisionPlan>,

    /// Highest precision the cache will ever answer for.
    #[serde(default = "Config::default_max_cached_precision")]
    pub max_cached_precision: u8,

    /// Nested term breakdowns are fetched, and served, up to this precision.
    #[serde(default = "Config::default_nested_terms_max_precision")]
    pub nested_terms_max_precision: u8,

    /// Entry count from which an index switches to the wide node profile.
    #[serde(default = "Config::default_wide_tree_threshold")]
    pub wide_tree_threshold: usize,
}

impl Config {
    fn default_precisions() -> Vec<PrecisionPlan> {
        vec![
            PrecisionPlan::new(4, TileSize::hemisphere()),
            PrecisionPlan::new(5, TileSize::new(90.0, 90.0)),
            PrecisionPlan::new(6, TileSize::new(90.0, 10.0)),
        ]
    }

    const fn default_max_cached_precision() -> u8 {
        6
    }

    const fn default_nested_terms_max_precision() -> u8 {
        5
    }

    const fn default_wide_tree_threshold() -> usize {
        10_000
    }

    /// Add a precision plan, replacing any existing plan for the same precision.
    pub fn with_precision(mut self, plan: PrecisionPlan) -> Self {
        match self
            .precisions
            .iter_mut()
            .find(|p| p.precision == plan.precision)
        {
            Some(existing) => *existing = plan,
            None => self.precisions.push(plan),
        }
        self
    }

    /// Replace every precision plan.
    pub fn with_precisions(mut self, plans: Vec<PrecisionPlan>) -> Self {
        self.precisions = plans;
        self
    }

    pub fn with_max_cached_precision(mut self, precision: u8) -> Self {
        self.max_cached_precision = precision;
        self
    }

    pub fn with_nested_terms_max_precision(mut self, precision: u8) -> Self {
        self.nested_terms_max_precision = precision;
        self
    }

    pub fn with_wide_tree_threshold(mut self, threshold: usize) -> Self {
        assert!(threshold > 0, "Wide tree threshold must be greater than zero");
        self.wide_tree_threshold = threshold;
        self
    }

    pub fn plan(&self, precision: u8) -> Option<&PrecisionPlan> {
        self.precisions.iter().find(|p| p.precision == precision)
    }

    /// Whether tile requests at `precision` ask for the nested term breakdown.
    pub fn wants_nested_terms(&self, precision: u8) -> bool {
        precision <= self.nested_terms_max_precision
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.precisions.is_empty() {
            return Err("At least one precision must be configured".to_string());
        }

        if !(1..=MAX_PRECISION).contains(&(self.max_cached_precision as usize)) {
            return Err(format!(
                "Max cached precision must be between 1 and {MAX_PRECISION}"
            ));
        }

        if self.nested_terms_max_precision > self.max_cached_precision {
            return Err(
                "Nested terms max precision cannot exceed max cached precision".to_string(),
            );
        }

        if self.wide_tree_threshold == 0 {
            return Err("Wide tree threshold must be greater than zero".to_string());
        }

        for (i, plan) in self.precisions.iter().enumerate() {
            if plan.precision == 0 || plan.precision > self.max_cached_precision {
                return Err(format!(
                    "Precision {} is outside 1..={}",
                    plan.precision, self.max_cached_precision
                ));
            }
            if self.precisions[..i]
                .iter()
                .any(|p| p.precision == plan.precision)
            {
                return Err(format!("Precision {} is configured twice", plan.precision));
            }
            let TileSize { lon_step, lat_step } = plan.tile;
            if !(lon_step.is_finite() && lon_step > 0.0 && lon_step <= 360.0) {
                return Err(format!(
                    "Tile longitude step for precision {} must be in (0, 360]",
                    plan.precision
                ));
            }
            if !(lat_step.is_finite() && lat_step > 0.0 && lat_step <= 180.0) {
                return Err(format!(
                    "Tile latitude step for precision {} must be in (0, 180]",
                    plan.precision
                ));
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            precisions: Self::default_precisions(),
            max_cached_precision: Self::default_max_cached_precision(),
            nested_terms_max_precision: Self::default_nested_terms_max_precision(),
            wide_tree_threshold: Self::default_wide_tree_threshold(),
        }
    }
}
