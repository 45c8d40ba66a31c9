use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, warn};

mod config;
use config::{PipelineConfig, Resolution};

mod core;
use crate::core::acquisition::CrawlOutcome;
use crate::core::DatasetSplit;

mod crawler;
use crawler::GoogleImageCrawler;

mod logging;

mod pipeline;
use pipeline::{PipelineOutcome, PipelineReport};

/// Download, clean and split an image classification dataset for one keyword
#[derive(Parser, Debug)]
#[command(name = "keyword-dataset-builder", version, about)]
struct Cli {
    /// JSON config file; missing fields use built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keyword to build the dataset for
    #[arg(short, long)]
    keyword: Option<String>,

    /// Target number of raw images
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Root directory for datasets
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for a reproducible train/val/test split
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

impl Cli {
    fn build_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(keyword) = &self.keyword {
            // The built-in search terms are phrasings of the default keyword
            if config.search_terms == PipelineConfig::default().search_terms {
                config.search_terms = PipelineConfig::default_search_terms(keyword);
            }
            config.keyword = keyword.clone();
        }
        if let Some(count) = self.count {
            config.target_count = count;
        }
        if let Some(output) = &self.output {
            config.output_root = output.clone();
        }
        if self.seed.is_some() {
            config.split_seed = self.seed;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(&cli.log_dir);

    let config = cli.build_config().context("invalid configuration")?;
    let Resolution { width, height } = config.target_resolution;
    info!(
        "Building dataset for '{}': {} images at {}x{}",
        config.keyword, config.target_count, width, height
    );

    let mut crawler =
        GoogleImageCrawler::new(&config.crawler).context("failed to create image crawler")?;
    let report = pipeline::run(&config, &mut crawler).context("dataset build failed")?;
    log_summary(&report);

    Ok(())
}

fn log_summary(report: &PipelineReport) {
    info!("Started with {} images in staging", report.acquisition.existing);
    for attempt in &report.acquisition.attempts {
        match &attempt.outcome {
            CrawlOutcome::Succeeded { downloaded } => info!(
                "Search '{}': requested {}, got {} ({} in staging)",
                attempt.term, attempt.requested, downloaded, attempt.collected
            ),
            CrawlOutcome::Failed { reason } => {
                warn!("Search '{}' failed: {}", attempt.term, reason)
            }
        }
    }
    if report.acquisition.failed_attempts() > 0 {
        warn!(
            "{} of {} searches failed",
            report.acquisition.failed_attempts(),
            report.acquisition.attempts.len()
        );
    }

    // The empty exit is reported by the pipeline itself
    if let PipelineOutcome::Completed {
        dataset_dir,
        materialization,
    } = &report.outcome
    {
        info!(
            "Images per split: train={}, val={}, test={}",
            materialization.moved_into(DatasetSplit::Train),
            materialization.moved_into(DatasetSplit::Val),
            materialization.moved_into(DatasetSplit::Test)
        );
        info!("Staging cleanup: {:?}", materialization.cleanup);
        if report.acquisition.remaining() > 0 {
            warn!(
                "Collected {} of {} requested images",
                report.acquisition.collected, report.acquisition.target
            );
        }
        info!("Done! Images downloaded and split into train/val/test.");
        info!("Dataset location: {:?}", dataset_dir);
    }
    debug!("Pipeline finished in stage {}", report.final_stage());
}
