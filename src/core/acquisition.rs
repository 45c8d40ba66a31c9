//! Acquisition stage: fill the staging directory up to the target count.
//!
//! Each search term gets the same quota, computed once from what was still
//! missing when the stage started. After every crawler call the staging
//! directory is re-listed and the remaining need is taken from that listing,
//! never from what the crawler claims to have written.

use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::core::operations::count_images;
use crate::crawler::ImageCrawler;

/// What happened for a single search term
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// `downloaded` is the growth of the staging directory, not the crawler's own count
    Succeeded { downloaded: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantAttempt {
    pub term: String,
    pub requested: usize,
    pub outcome: CrawlOutcome,
    /// Images in staging after this attempt
    pub collected: usize,
    /// Wait before the next term; zero after the last one or once the target is met
    pub pause: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionReport {
    pub target: usize,
    pub existing: usize,
    pub collected: usize,
    pub attempts: Vec<VariantAttempt>,
}

impl AcquisitionReport {
    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(self.collected)
    }

    pub fn failed_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, CrawlOutcome::Failed { .. }))
            .count()
    }
}

/// Run the crawler over the configured search terms until `staging_dir`
/// holds `config.target_count` images or the terms run out.
///
/// Never fails: crawler errors are logged and recorded as
/// [`CrawlOutcome::Failed`].
pub fn acquire<C: ImageCrawler + ?Sized>(
    config: &PipelineConfig,
    crawler: &mut C,
    staging_dir: &Path,
) -> AcquisitionReport {
    let existing = recount(staging_dir, 0);
    let mut report = AcquisitionReport {
        target: config.target_count,
        existing,
        collected: existing,
        attempts: Vec::new(),
    };

    info!("Existing images: {}", existing);
    info!("Additional needed: {}", report.remaining());

    if report.remaining() == 0 {
        return report;
    }

    let terms: Vec<&str> = config
        .search_terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        warn!("No search terms configured, skipping download");
        return report;
    }

    let per_term_quota = report.remaining().div_ceil(terms.len());
    debug!("Per-term quota: {}", per_term_quota);

    for (i, term) in terms.iter().enumerate() {
        if report.remaining() == 0 {
            break;
        }

        let requested = per_term_quota.min(report.remaining());
        info!(
            "Crawling with keyword '{}'... ({}/{})",
            term,
            i + 1,
            terms.len()
        );

        let before = report.collected;
        let result = crawler.crawl(term, requested, staging_dir);
        report.collected = recount(staging_dir, before);

        let (outcome, delay) = match result {
            Ok(claimed) => {
                let downloaded = report.collected.saturating_sub(before);
                debug!("Crawler reported {} files, staging grew by {}", claimed, downloaded);
                info!("Total collected so far: {}", report.collected);
                (CrawlOutcome::Succeeded { downloaded }, config.inter_request_delay)
            }
            Err(e) => {
                warn!("Failed for keyword '{}': {}", term, e);
                (
                    CrawlOutcome::Failed {
                        reason: e.to_string(),
                    },
                    config.error_retry_delay,
                )
            }
        };

        let more_terms = i + 1 < terms.len();
        let pause = if more_terms && report.remaining() > 0 {
            delay
        } else {
            Duration::ZERO
        };

        report.attempts.push(VariantAttempt {
            term: term.to_string(),
            requested,
            outcome,
            collected: report.collected,
            pause,
        });
        wait(pause);
    }

    if report.remaining() > 0 {
        warn!(
            "Search terms exhausted with {} of {} images collected",
            report.collected, report.target
        );
    }

    report
}

/// Re-list staging; keep `fallback` when the directory cannot be read
fn recount(staging_dir: &Path, fallback: usize) -> usize {
    match count_images(staging_dir) {
        Ok(count) => count,
        Err(e) => {
            warn!("Failed to count images in {:?}: {}", staging_dir, e);
            fallback
        }
    }
}

fn wait(delay: Duration) {
    if !delay.is_zero() {
        info!("Waiting {:.0}s...", delay.as_secs_f64());
        thread::sleep(delay);
    }
}
