//! Configuration for the aggregation engine.
//!
//! The grid configuration is fixed once before any entity is processed and
//! shared by every geo-distribution; it must not change afterwards.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, TagStatsError};

/// Bounding box and raster resolution for distribution images.
///
/// The default covers the whole world at one cell per degree (360x180),
/// matching the defaults of the reference statistics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            minx: -180.0,
            miny: -90.0,
            maxx: 180.0,
            maxy: 90.0,
            width: 360,
            height: 180,
        }
    }
}

impl GridConfig {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64, width: u32, height: u32) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
            width,
            height,
        }
    }

    /// Total number of grid cells.
    pub fn size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Validate bounding box and dimensions.
    pub fn validate(&self) -> Result<()> {
        for v in [self.minx, self.miny, self.maxx, self.maxy] {
            if !v.is_finite() {
                return Err(TagStatsError::Config(
                    "bounding box coordinates must be finite".to_string(),
                ));
            }
        }
        if self.minx >= self.maxx || self.miny >= self.maxy {
            return Err(TagStatsError::Config(format!(
                "empty bounding box ({}, {}, {}, {})",
                self.minx, self.miny, self.maxx, self.maxy
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(TagStatsError::Config(
                "grid dimensions must be positive".to_string(),
            ));
        }
        // The sentinel cell id is u32::MAX, so the grid must stay below it.
        if self.size() >= u64::from(u32::MAX) {
            return Err(TagStatsError::Config(format!(
                "grid too large: {}x{} cells",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Storage strategy for the node location index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IndexBackend {
    /// Dense in-memory array, fastest for near-contiguous id spaces.
    DenseMem,
    /// Hash map, best when ids are sparse (recommended default).
    #[default]
    SparseMem,
    /// Dense array in anonymous memory-mapped pages.
    DenseMapped,
    /// Sorted id/cell pairs in memory-mapped pages, binary-searched.
    SparseMapped,
}

impl FromStr for IndexBackend {
    type Err = TagStatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dense-mem" => Ok(IndexBackend::DenseMem),
            "sparse-mem" => Ok(IndexBackend::SparseMem),
            "dense-mapped" => Ok(IndexBackend::DenseMapped),
            "sparse-mapped" => Ok(IndexBackend::SparseMapped),
            other => Err(TagStatsError::Config(format!(
                "unknown location index backend: {other}"
            ))),
        }
    }
}

/// Restricts which key/value pairs and relation types get the more expensive
/// per-tag tracking. Without a selection, everything is tracked on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Bare keys tracked as key/value statistics.
    #[serde(default)]
    pub keys: Vec<String>,
    /// (key, value) pairs tracked as key/value statistics.
    #[serde(default)]
    pub tags: Vec<(String, String)>,
    /// (key, value) pairs that get their own geo-distribution.
    #[serde(default)]
    pub frequent_tags: Vec<(String, String)>,
    /// Relation type values tracked in relation type statistics.
    #[serde(default)]
    pub relation_types: Vec<String>,
}

/// Full configuration for the aggregation orchestrator.
///
/// # Example
///
/// ```rust
/// use tagstats::AggregatorConfig;
///
/// let json = r#"{
///     "index_backend": "dense-mem",
///     "min_combination_count": 100
/// }"#;
/// let config = AggregatorConfig::from_json(json).unwrap();
/// assert_eq!(config.min_combination_count, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub index_backend: IndexBackend,

    /// Tag combinations not appearing at least this often are not written
    /// to the persistence sink.
    #[serde(default = "AggregatorConfig::default_min_combination_count")]
    pub min_combination_count: u64,

    #[serde(default)]
    pub selection: Option<Selection>,
}

impl AggregatorConfig {
    const fn default_min_combination_count() -> u64 {
        1000
    }

    pub fn with_grid(mut self, grid: GridConfig) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_index_backend(mut self, backend: IndexBackend) -> Self {
        self.index_backend = backend;
        self
    }

    pub fn with_min_combination_count(mut self, count: u64) -> Self {
        self.min_combination_count = count;
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()
    }

    /// Load configuration from a JSON string and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AggregatorConfig = serde_json::from_str(json)
            .map_err(|e| TagStatsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| TagStatsError::Config(e.to_string()))
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            index_backend: IndexBackend::default(),
            min_combination_count: Self::default_min_combination_count(),
            selection: None,
        }
    }
}
