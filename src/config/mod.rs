mod app_config;

pub use app_config::{ConfigError, CrawlerConfig, PipelineConfig, Resolution};
