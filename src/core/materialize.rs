//! Materialization stage: move each split's files out of staging into
//! `<base>/<split>/<label>/` and remove staging once it is empty.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::core::dataset::{DatasetLayout, DatasetSplit};
use crate::core::operations::{count_entries, move_file, FileOpError, FileOpResult};
use crate::core::partition::SplitAssignment;

/// How the staging directory was left after all moves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingCleanup {
    Removed,
    LeftNonEmpty { remaining: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializationReport {
    /// Files moved per split, in materialization order
    pub moved: Vec<(DatasetSplit, usize)>,
    pub cleanup: StagingCleanup,
}

impl MaterializationReport {
    pub fn moved_into(&self, split: DatasetSplit) -> usize {
        self.moved
            .iter()
            .find(|(s, _)| *s == split)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Move every assigned file from staging into its split directory.
///
/// A failed move is returned as an error; failing to remove staging is not.
pub fn materialize(
    layout: &DatasetLayout,
    assignment: &SplitAssignment,
) -> FileOpResult<MaterializationReport> {
    let staging_dir = layout.staging_dir();
    let mut moved = Vec::with_capacity(DatasetSplit::ALL.len());

    for split in DatasetSplit::ALL {
        let split_dir = layout.split_dir(split);
        fs::create_dir_all(&split_dir).map_err(|source| FileOpError::CreateDirFailed {
            path: split_dir.clone(),
            source,
        })?;

        let files = assignment.get(split);
        for file_name in files {
            move_file(&staging_dir.join(file_name), &split_dir.join(file_name))?;
        }
        info!("Moved {} images into {:?}", files.len(), split_dir);
        moved.push((split, files.len()));
    }

    let cleanup = cleanup_staging(&staging_dir);
    Ok(MaterializationReport { moved, cleanup })
}

/// Remove `staging_dir` only if nothing is left in it
pub fn cleanup_staging(staging_dir: &Path) -> StagingCleanup {
    let outcome = match count_entries(staging_dir) {
        Ok(0) => match fs::remove_dir(staging_dir) {
            Ok(()) => StagingCleanup::Removed,
            Err(e) => StagingCleanup::Failed {
                reason: e.to_string(),
            },
        },
        Ok(remaining) => StagingCleanup::LeftNonEmpty { remaining },
        Err(e) => StagingCleanup::Failed {
            reason: e.to_string(),
        },
    };

    match &outcome {
        StagingCleanup::Removed => info!("Removed staging directory {:?}", staging_dir),
        StagingCleanup::LeftNonEmpty { remaining } => warn!(
            "Staging directory {:?} left in place, {} entries remain",
            staging_dir, remaining
        ),
        StagingCleanup::Failed { reason } => {
            warn!("Could not remove staging directory {:?}: {}", staging_dir, reason)
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Dataset;
    use std::collections::HashSet;

    fn setup(names: &[&str]) -> (tempfile::TempDir, DatasetLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::new(dir.path().join("lion"), "lion");
        fs::create_dir_all(layout.staging_dir()).unwrap();
        for name in names {
            fs::write(layout.staging_dir().join(name), name.as_bytes()).unwrap();
        }
        (dir, layout)
    }

    fn assignment(train: &[&str], val: &[&str], test: &[&str]) -> SplitAssignment {
        fn owned(names: &[&str]) -> Vec<String> {
            names.iter().map(|s| s.to_string()).collect()
        }
        SplitAssignment {
            train: owned(train),
            val: owned(val),
            test: owned(test),
        }
    }

    #[test]
    fn test_every_file_lands_in_one_split() {
        let names = ["lion_0000.jpg", "lion_0001.jpg", "lion_0002.jpg", "lion_0003.jpg"];
        let (_dir, layout) = setup(&names);

        let report = materialize(
            &layout,
            &assignment(&names[..2], &names[2..3], &names[3..]),
        )
        .unwrap();

        assert_eq!(report.moved_into(DatasetSplit::Train), 2);
        assert_eq!(report.moved_into(DatasetSplit::Val), 1);
        assert_eq!(report.moved_into(DatasetSplit::Test), 1);
        assert_eq!(report.cleanup, StagingCleanup::Removed);
        assert!(!layout.staging_dir().exists());

        let dataset = Dataset::load(&layout);
        let mut seen = HashSet::new();
        for split in DatasetSplit::ALL {
            for path in dataset.files(split) {
                let name = path.file_name().unwrap().to_string_lossy().to_string();
                assert!(seen.insert(name));
            }
        }
        assert_eq!(seen.len(), names.len());
        assert!(layout
            .split_dir(DatasetSplit::Val)
            .join("lion_0002.jpg")
            .exists());
    }

    #[test]
    fn test_empty_split_still_gets_directory() {
        let (_dir, layout) = setup(&["lion_0000.jpg"]);
        materialize(&layout, &assignment(&["lion_0000.jpg"], &[], &[])).unwrap();
        assert!(layout.split_dir(DatasetSplit::Val).is_dir());
        assert!(layout.split_dir(DatasetSplit::Test).is_dir());
    }

    #[test]
    fn test_leftover_files_keep_staging() {
        let (_dir, layout) = setup(&["lion_0000.jpg", "notes.txt"]);

        let report = materialize(&layout, &assignment(&["lion_0000.jpg"], &[], &[])).unwrap();

        assert_eq!(report.cleanup, StagingCleanup::LeftNonEmpty { remaining: 1 });
        assert!(layout.staging_dir().join("notes.txt").exists());
    }

    #[test]
    fn test_split_dir_creation_failure_names_the_path() {
        let (_dir, layout) = setup(&["lion_0000.jpg"]);
        // A plain file where the train directory should go
        fs::write(layout.base_dir().join("train"), b"").unwrap();

        let result = materialize(&layout, &assignment(&["lion_0000.jpg"], &[], &[]));

        match result {
            Err(FileOpError::CreateDirFailed { path, .. }) => {
                assert_eq!(path, layout.split_dir(DatasetSplit::Train))
            }
            other => panic!("expected a directory creation error, got {:?}", other),
        }
        assert!(layout.staging_dir().join("lion_0000.jpg").exists());
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let (_dir, layout) = setup(&[]);
        let result = materialize(&layout, &assignment(&["lion_0000.jpg"], &[], &[]));
        assert!(result.is_err());
    }
}
