use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::core::partition::SplitRatios;

/// Errors raised while loading or validating a [`PipelineConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("keyword must not be empty")]
    EmptyKeyword,
    #[error("keyword must be a plain directory name, got {0:?}")]
    InvalidKeyword(String),
    #[error("label must be a plain directory name, got {0:?}")]
    InvalidLabel(String),
    #[error("at least one search term is required")]
    NoSearchTerms,
    #[error("target resolution must be non-zero, got {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },
    #[error("jpeg quality must be within 1..=100, got {0}")]
    InvalidJpegQuality(u8),
    #[error("invalid split ratios ({train}, {val}, {test}): {reason}")]
    InvalidSplitRatios {
        train: f64,
        val: f64,
        test: f64,
        reason: &'static str,
    },
}

/// Output image size after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Settings handed to the image search crawler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Image search endpoint; result pages are requested with `q`, `tbm`, `ijn` and `start`
    pub search_url: String,
    pub user_agent: String,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Result pages requested per search term
    pub max_pages: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.google.com/search".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            request_timeout: Duration::from_secs(10),
            max_pages: 5,
        }
    }
}

/// Pipeline configuration, built once and passed by reference to every stage.
///
/// Defaults describe a 2000-image "lion" dataset at 256x256 split 70/15/15.
/// A JSON file may override any subset of the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub keyword: String,
    /// Class directory name under each split; falls back to `keyword`
    pub label: Option<String>,
    pub output_root: PathBuf,
    pub target_count: usize,
    pub target_resolution: Resolution,
    pub split_ratios: SplitRatios,
    pub search_terms: Vec<String>,
    pub min_dimension: u32,
    pub jpeg_quality: u8,
    #[serde(with = "duration_secs")]
    pub inter_request_delay: Duration,
    #[serde(with = "duration_secs")]
    pub error_retry_delay: Duration,
    /// Fixed seed for the train/val/test shuffle; `None` draws a fresh one per run
    pub split_seed: Option<u64>,
    pub crawler: CrawlerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keyword: "lion".to_string(),
            label: None,
            output_root: PathBuf::from("dataset"),
            target_count: 2000,
            target_resolution: Resolution::new(256, 256),
            split_ratios: SplitRatios::default(),
            search_terms: [
                "lion animal",
                "african lion",
                "male lion",
                "lioness female lion",
                "lion pride",
                "lion wildlife",
                "lion savanna",
                "lion portrait",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_dimension: 100,
            jpeg_quality: 95,
            inter_request_delay: Duration::from_secs(15),
            error_retry_delay: Duration::from_secs(20),
            split_seed: None,
            crawler: CrawlerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a config file. Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading pipeline config from: {:?}", path);
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Search phrasings used when only a keyword is known
    pub fn default_search_terms(keyword: &str) -> Vec<String> {
        vec![
            keyword.to_string(),
            format!("{} photo", keyword),
            format!("{} image", keyword),
        ]
    }

    /// Class label used for split directories and output filenames
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.keyword)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keyword.trim().is_empty() {
            return Err(ConfigError::EmptyKeyword);
        }

        if !is_plain_dir_name(&self.keyword) {
            return Err(ConfigError::InvalidKeyword(self.keyword.clone()));
        }

        let label = self.label();
        if !is_plain_dir_name(label) {
            return Err(ConfigError::InvalidLabel(label.to_string()));
        }

        if self.search_terms.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::NoSearchTerms);
        }

        let Resolution { width, height } = self.target_resolution;
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidResolution { width, height });
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidJpegQuality(self.jpeg_quality));
        }

        self.split_ratios.validate()
    }
}

/// A single path component that stays inside its parent directory
fn is_plain_dir_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Serialize a [`Duration`] as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
