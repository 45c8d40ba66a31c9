//! Image search crawling.
//!
//! The pipeline only sees the [`ImageCrawler`] trait: give it a search term,
//! an upper bound and a directory, and it writes whatever it manages to
//! download. How many files actually land on disk is checked separately by
//! re-listing the directory, so implementations are free to under-deliver.

mod google;
mod parser;

use std::path::Path;
use thiserror::Error;

pub use google::GoogleImageCrawler;

/// Errors that abort a whole search term
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search for {term:?} returned HTTP {status}")]
    Status { term: String, status: u16 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A blocking image search crawler
pub trait ImageCrawler {
    /// Download up to `max_num` images for `term` into `dest`.
    ///
    /// Returns the number of files written. Individual download failures are
    /// not errors; only a failure of the search itself is.
    fn crawl(&mut self, term: &str, max_num: usize, dest: &Path) -> Result<usize, CrawlError>;
}
