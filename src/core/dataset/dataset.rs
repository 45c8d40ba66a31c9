use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::core::operations::list_images;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetSplit {
    Train,
    Val,
    Test,
}

impl DatasetSplit {
    /// Splits in materialization order
    pub const ALL: [DatasetSplit; 3] = [DatasetSplit::Train, DatasetSplit::Val, DatasetSplit::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
            DatasetSplit::Test => "test",
        }
    }
}

/// On-disk locations for one keyword's dataset.
///
/// ```text
/// <output_root>/<keyword>/raw                    staging, removed at the end
/// <output_root>/<keyword>/<split>/<label>/*.jpg  final images
/// ```
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    base_dir: PathBuf,
    label: String,
}

impl DatasetLayout {
    pub fn new(base_dir: PathBuf, label: impl Into<String>) -> Self {
        Self {
            base_dir,
            label: label.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.output_root.join(&config.keyword), config.label())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("raw")
    }

    pub fn split_dir(&self, split: DatasetSplit) -> PathBuf {
        self.base_dir.join(split.as_str()).join(&self.label)
    }
}

/// Snapshot of the images currently sitting in each split directory
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    train: Vec<PathBuf>,
    val: Vec<PathBuf>,
    test: Vec<PathBuf>,
}

impl Dataset {
    pub fn load(layout: &DatasetLayout) -> Self {
        let mut dataset = Self::default();
        for split in DatasetSplit::ALL {
            *dataset.files_mut(split) = Self::load_split(layout, split);
        }
        dataset
    }

    fn load_split(layout: &DatasetLayout, split: DatasetSplit) -> Vec<PathBuf> {
        let split_path = layout.split_dir(split);
        if !split_path.is_dir() {
            return Vec::new();
        }

        match list_images(&split_path) {
            Ok(files) => {
                info!("Found {} images in {:?}", files.len(), split_path);
                files
            }
            Err(e) => {
                warn!("Failed to read directory {:?}: {}", split_path, e);
                Vec::new()
            }
        }
    }

    pub fn files(&self, split: DatasetSplit) -> &[PathBuf] {
        match split {
            DatasetSplit::Train => &self.train,
            DatasetSplit::Val => &self.val,
            DatasetSplit::Test => &self.test,
        }
    }

    fn files_mut(&mut self, split: DatasetSplit) -> &mut Vec<PathBuf> {
        match split {
            DatasetSplit::Train => &mut self.train,
            DatasetSplit::Val => &mut self.val,
            DatasetSplit::Test => &mut self.test,
        }
    }

    pub fn total_images(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// Whether any split directory exists under the dataset base
    pub fn has_split_dirs(layout: &DatasetLayout) -> bool {
        DatasetSplit::ALL
            .iter()
            .any(|split| fs::metadata(layout.base_dir().join(split.as_str())).is_ok())
    }
}
