//! End-to-end dataset build for one keyword.
//!
//! `ACQUIRING → NORMALIZING → (EMPTY_EXIT | PARTITIONING → MATERIALIZING → DONE)`
//!
//! Each stage runs once and sees the full file list of the stage before it.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::core::operations::FileOpError;
use crate::core::{
    acquire, materialize, normalize, partition, AcquisitionReport, Dataset, DatasetLayout,
    DatasetSplit, MaterializationReport, NormalizationReport, SplitAssignment,
};
use crate::crawler::ImageCrawler;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to normalize images in {path:?}: {source}")]
    Normalize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to materialize splits: {0}")]
    Materialize(#[from] FileOpError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Acquiring,
    Normalizing,
    Partitioning,
    Materializing,
    Done,
    EmptyExit,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Acquiring => "acquiring",
            PipelineStage::Normalizing => "normalizing",
            PipelineStage::Partitioning => "partitioning",
            PipelineStage::Materializing => "materializing",
            PipelineStage::Done => "done",
            PipelineStage::EmptyExit => "empty-exit",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Nothing survived normalization; no split directories were created
    NoValidImages,
    Completed {
        dataset_dir: PathBuf,
        materialization: MaterializationReport,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub acquisition: AcquisitionReport,
    pub normalization: NormalizationReport,
    pub outcome: PipelineOutcome,
}

impl PipelineReport {
    pub fn final_stage(&self) -> PipelineStage {
        match self.outcome {
            PipelineOutcome::NoValidImages => PipelineStage::EmptyExit,
            PipelineOutcome::Completed { .. } => PipelineStage::Done,
        }
    }
}

fn enter(stage: PipelineStage) {
    info!("Pipeline stage: {}", stage);
}

/// Build the dataset described by `config`, downloading through `crawler`.
pub fn run<C: ImageCrawler + ?Sized>(
    config: &PipelineConfig,
    crawler: &mut C,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;

    let layout = DatasetLayout::from_config(config);
    if Dataset::has_split_dirs(&layout) {
        warn!(
            "Split directories already exist under {:?}; matching file names will be replaced",
            layout.base_dir()
        );
    }
    let staging_dir = layout.staging_dir();
    fs::create_dir_all(&staging_dir).map_err(|source| PipelineError::CreateDir {
        path: staging_dir.clone(),
        source,
    })?;

    let acquisition = {
        let _span = info_span!("acquisition").entered();
        enter(PipelineStage::Acquiring);
        acquire(config, crawler, &staging_dir)
    };

    let normalization = {
        let _span = info_span!("normalization").entered();
        enter(PipelineStage::Normalizing);
        normalize(config, &staging_dir).map_err(|source| PipelineError::Normalize {
            path: staging_dir.clone(),
            source,
        })?
    };

    if normalization.accepted.is_empty() {
        enter(PipelineStage::EmptyExit);
        warn!("No valid images found.");
        return Ok(PipelineReport {
            acquisition,
            normalization,
            outcome: PipelineOutcome::NoValidImages,
        });
    }

    let assignment = {
        let _span = info_span!("partitioning").entered();
        enter(PipelineStage::Partitioning);
        split(config, normalization.accepted.clone())
    };
    debug_assert_eq!(assignment.total(), normalization.accepted.len());

    let materialization = {
        let _span = info_span!("materialization").entered();
        enter(PipelineStage::Materializing);
        materialize(&layout, &assignment)?
    };

    let dataset = Dataset::load(&layout);
    info!("Dataset holds {} images", dataset.total_images());
    for split in DatasetSplit::ALL {
        info!(
            "{}: {} images in {:?}",
            split.as_str(),
            dataset.files(split).len(),
            layout.split_dir(split)
        );
    }

    enter(PipelineStage::Done);
    Ok(PipelineReport {
        acquisition,
        normalization,
        outcome: PipelineOutcome::Completed {
            dataset_dir: layout.base_dir().to_path_buf(),
            materialization,
        },
    })
}

/// Shuffle with the configured seed, or a fresh one when none is set
fn split(config: &PipelineConfig, files: Vec<String>) -> SplitAssignment {
    match config.split_seed {
        Some(seed) => {
            info!("Splitting with fixed seed {}", seed);
            partition(files, &config.split_ratios, &mut StdRng::seed_from_u64(seed))
        }
        None => partition(files, &config.split_ratios, &mut rand::thread_rng()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use crate::core::acquisition::CrawlOutcome;
    use crate::core::materialize::StagingCleanup;
    use crate::core::partition::SplitRatios;
    use crate::crawler::CrawlError;
    use image::{ImageBuffer, Rgb, RgbImage};
    use std::collections::HashSet;
    use std::path::Path;
    use std::time::Duration;

    /// Writes real images; every `small_every`-th one is too small to keep
    struct ImageWritingCrawler {
        per_call: usize,
        small_every: Option<usize>,
        written: usize,
        calls: usize,
    }

    impl ImageWritingCrawler {
        fn new(per_call: usize) -> Self {
            Self {
                per_call,
                small_every: None,
                written: 0,
                calls: 0,
            }
        }
    }

    impl ImageCrawler for ImageWritingCrawler {
        fn crawl(&mut self, _term: &str, max_num: usize, dest: &Path) -> Result<usize, CrawlError> {
            self.calls += 1;
            let n = self.per_call.min(max_num);
            for _ in 0..n {
                self.written += 1;
                let small = self.small_every.is_some_and(|k| self.written % k == 0);
                let side = if small { 40 } else { 120 };
                let img: RgbImage = ImageBuffer::from_pixel(side, side, Rgb([180, 140, 60]));
                img.save(dest.join(format!("{:06}.png", self.written)))
                    .map_err(|e| CrawlError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
            }
            Ok(n)
        }
    }

    struct FailingCrawler;

    impl ImageCrawler for FailingCrawler {
        fn crawl(
            &mut self,
            term: &str,
            _max_num: usize,
            _dest: &Path,
        ) -> Result<usize, CrawlError> {
            Err(CrawlError::Status {
                term: term.to_string(),
                status: 429,
            })
        }
    }

    fn config(root: &Path, target: usize) -> PipelineConfig {
        PipelineConfig {
            keyword: "lion".to_string(),
            output_root: root.to_path_buf(),
            target_count: target,
            target_resolution: Resolution::new(32, 32),
            search_terms: vec!["lion animal".to_string(), "african lion".to_string()],
            inter_request_delay: Duration::ZERO,
            error_retry_delay: Duration::ZERO,
            split_seed: Some(3),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_full_run_builds_splits() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 10);
        let mut crawler = ImageWritingCrawler::new(5);

        let report = run(&config, &mut crawler).unwrap();

        assert_eq!(crawler.calls, 2);
        assert_eq!(report.acquisition.collected, 10);
        assert_eq!(report.normalization.accepted.len(), 10);
        assert_eq!(report.final_stage(), PipelineStage::Done);

        let PipelineOutcome::Completed {
            dataset_dir,
            materialization,
        } = &report.outcome
        else {
            panic!("expected a completed run, got {:?}", report.outcome);
        };
        assert_eq!(dataset_dir, &dir.path().join("lion"));
        assert_eq!(materialization.moved_into(DatasetSplit::Train), 7);
        assert_eq!(materialization.moved_into(DatasetSplit::Val), 1);
        assert_eq!(materialization.moved_into(DatasetSplit::Test), 2);
        assert_eq!(materialization.cleanup, StagingCleanup::Removed);

        let layout = DatasetLayout::from_config(&config);
        let dataset = Dataset::load(&layout);
        let names: HashSet<String> = DatasetSplit::ALL
            .iter()
            .flat_map(|&s| dataset.files(s).iter())
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        let expected: HashSet<String> = report.normalization.accepted.iter().cloned().collect();
        assert_eq!(names, expected);
        assert_eq!(dataset.total_images(), 10);

        let sample = image::open(&dataset.files(DatasetSplit::Train)[0]).unwrap();
        assert_eq!((sample.width(), sample.height()), (32, 32));
    }

    #[test]
    fn test_small_images_are_dropped_before_splitting() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 10);
        let mut crawler = ImageWritingCrawler::new(5);
        crawler.small_every = Some(5);

        let report = run(&config, &mut crawler).unwrap();

        assert_eq!(report.normalization.undersized, 2);
        assert_eq!(report.normalization.accepted.len(), 8);
        assert_eq!(Dataset::load(&DatasetLayout::from_config(&config)).total_images(), 8);
    }

    #[test]
    fn test_no_valid_images_creates_no_splits() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 10);

        let report = run(&config, &mut FailingCrawler).unwrap();

        assert_eq!(report.outcome, PipelineOutcome::NoValidImages);
        assert_eq!(report.final_stage(), PipelineStage::EmptyExit);
        assert_eq!(report.acquisition.failed_attempts(), 2);
        assert!(matches!(
            report.acquisition.attempts[0].outcome,
            CrawlOutcome::Failed { .. }
        ));
        assert!(!Dataset::has_split_dirs(&DatasetLayout::from_config(&config)));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), 10);
        config.split_ratios = SplitRatios::new(0.9, 0.9, 0.0);

        let result = run(&config, &mut FailingCrawler);

        assert!(matches!(result, Err(PipelineError::Config(_))));
        assert!(!dir.path().join("lion").exists());
    }

    #[test]
    fn test_existing_images_skip_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 4);
        let staging = DatasetLayout::from_config(&config).staging_dir();
        fs::create_dir_all(&staging).unwrap();
        for i in 0..4 {
            let img: RgbImage = ImageBuffer::from_pixel(150, 110, Rgb([10, 20, 30]));
            img.save(staging.join(format!("{:06}.jpg", i + 1))).unwrap();
        }
        let mut crawler = ImageWritingCrawler::new(5);

        let report = run(&config, &mut crawler).unwrap();

        assert_eq!(crawler.calls, 0);
        assert_eq!(report.acquisition.existing, 4);
        assert_eq!(report.normalization.accepted.len(), 4);
        assert_eq!(report.final_stage(), PipelineStage::Done);
    }
}
