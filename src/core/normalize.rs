//! Normalization stage: turn whatever the crawler left in staging into
//! uniformly sized RGB JPEGs named `<label>_NNNN.jpg`.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageError, ImageReader};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::core::operations::{list_images, remove_file_best_effort};

/// Suffix for outputs that have been encoded but not yet given their final name
const PARTIAL_SUFFIX: &str = "part";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Output filenames in index order
    pub accepted: Vec<String>,
    pub undersized: usize,
    pub failed: usize,
}

enum Verdict {
    Accepted,
    Undersized { width: u32, height: u32 },
}

/// Output filename for the `index`-th accepted image
pub fn output_file_name(label: &str, index: usize) -> String {
    format!("{}_{:04}.jpg", label, index)
}

/// Validate, resize and re-encode every image in `staging_dir`.
///
/// Undersized and undecodable files are deleted. Outputs are first written
/// as `<name>.part` and renamed once every source has been visited, so a
/// freshly written output can never clobber a source that is still queued.
/// Accepted sources are only deleted after every rename has succeeded; if a
/// rename fails, the outputs of this run are rolled back and the sources are
/// left in staging for the next run.
pub fn normalize(config: &PipelineConfig, staging_dir: &Path) -> io::Result<NormalizationReport> {
    clear_partial_outputs(staging_dir)?;

    let sources = list_images(staging_dir)?;
    info!("Resizing and cleaning {} images...", sources.len());

    let mut report = NormalizationReport::default();
    let mut pending: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut consumed: Vec<&PathBuf> = Vec::new();

    for source in &sources {
        let file_name = output_file_name(config.label(), report.accepted.len());
        let final_path = staging_dir.join(&file_name);
        let partial_path = staging_dir.join(format!("{}.{}", file_name, PARTIAL_SUFFIX));

        match process_image(config, source, &partial_path) {
            Ok(Verdict::Accepted) => {
                consumed.push(source);
                debug!("Accepted {:?} as {}", source, file_name);
                pending.push((partial_path, final_path));
                report.accepted.push(file_name);
            }
            Ok(Verdict::Undersized { width, height }) => {
                debug!("Removing undersized {:?} ({}x{})", source, width, height);
                remove_file_best_effort(source);
                report.undersized += 1;
            }
            Err(e) => {
                warn!("Failed to process {:?}: {}", source, e);
                remove_file_best_effort(&partial_path);
                remove_file_best_effort(source);
                report.failed += 1;
            }
        }
    }

    publish_outputs(&pending, &sources)?;

    let outputs: HashSet<&PathBuf> = pending.iter().map(|(_, final_path)| final_path).collect();
    for source in consumed {
        if !outputs.contains(source) {
            remove_file_best_effort(source);
        }
    }

    info!(
        "Valid images: {} ({} too small, {} unreadable)",
        report.accepted.len(),
        report.undersized,
        report.failed
    );

    Ok(report)
}

fn process_image(
    config: &PipelineConfig,
    source: &Path,
    dest: &Path,
) -> Result<Verdict, NormalizeError> {
    let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;

    let (width, height) = (img.width(), img.height());
    if width < config.min_dimension || height < config.min_dimension {
        return Ok(Verdict::Undersized { width, height });
    }

    let rgb = img.to_rgb8();
    let target = config.target_resolution;
    let resized = imageops::resize(&rgb, target.width, target.height, FilterType::Lanczos3);

    let mut writer = BufWriter::new(File::create(dest)?);
    JpegEncoder::new_with_quality(&mut writer, config.jpeg_quality).encode_image(&resized)?;
    writer.flush()?;

    Ok(Verdict::Accepted)
}

/// Give every `.part` output its final name.
///
/// On failure, outputs renamed so far that did not replace a source are
/// removed together with the remaining `.part` files.
fn publish_outputs(pending: &[(PathBuf, PathBuf)], sources: &[PathBuf]) -> io::Result<()> {
    for (i, (partial_path, final_path)) in pending.iter().enumerate() {
        if let Err(e) = fs::rename(partial_path, final_path) {
            warn!(
                "Failed to rename {:?} to {:?}: {}, rolling back",
                partial_path, final_path, e
            );
            for (_, published) in &pending[..i] {
                if !sources.contains(published) {
                    remove_file_best_effort(published);
                }
            }
            for (partial, _) in &pending[i..] {
                remove_file_best_effort(partial);
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Drop `.part` leftovers from an interrupted earlier run
fn clear_partial_outputs(staging_dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(staging_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == PARTIAL_SUFFIX) {
            debug!("Removing stale partial output {:?}", path);
            remove_file_best_effort(&path);
        }
    }
    Ok(())
}
