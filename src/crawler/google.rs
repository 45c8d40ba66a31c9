use image::ImageFormat;
use reqwest::blocking::Client;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::parser::extract_image_urls;
use super::{CrawlError, ImageCrawler};
use crate::config::CrawlerConfig;

/// Results Google serves per `ijn` page
const RESULTS_PER_PAGE: usize = 100;

/// Google Images crawler.
///
/// Pages through the image results for a term, extracts the original image
/// URLs and downloads them one at a time into the destination directory as
/// `NNNNNN.<ext>`, continuing the numbering of files already there.
#[derive(Debug)]
pub struct GoogleImageCrawler {
    client: Client,
    search_url: String,
    max_pages: usize,
}

impl GoogleImageCrawler {
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            search_url: config.search_url.clone(),
            max_pages: config.max_pages.max(1),
        })
    }

    fn fetch_page(&self, term: &str, page: usize) -> Result<String, CrawlError> {
        let ijn = page.to_string();
        let start = (page * RESULTS_PER_PAGE).to_string();
        debug!("Requesting result page {} for {:?}", page, term);

        let response = self
            .client
            .get(&self.search_url)
            .query(&[
                ("q", term),
                ("tbm", "isch"),
                ("ijn", ijn.as_str()),
                ("start", start.as_str()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                term: term.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text()?)
    }

    /// Download one image. `Ok(None)` means the URL was reachable but did not
    /// serve a usable image.
    fn download(
        &self,
        url: &str,
        dest: &Path,
        index: usize,
    ) -> Result<Option<PathBuf>, CrawlError> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            debug!("Skipping {}: HTTP {}", url, response.status());
            return Ok(None);
        }

        let bytes = response.bytes()?;
        let Some(ext) = file_extension_for(&bytes) else {
            debug!("Skipping {}: not a JPEG, PNG or BMP image", url);
            return Ok(None);
        };

        let path = dest.join(format!("{:06}.{}", index, ext));
        fs::write(&path, &bytes)?;
        Ok(Some(path))
    }
}

impl ImageCrawler for GoogleImageCrawler {
    fn crawl(&mut self, term: &str, max_num: usize, dest: &Path) -> Result<usize, CrawlError> {
        fs::create_dir_all(dest)?;

        let mut next_index = next_file_index(dest)?;
        let mut seen_urls = HashSet::new();
        let mut saved = 0;

        for page in 0..self.max_pages {
            if saved >= max_num {
                break;
            }

            let body = match self.fetch_page(term, page) {
                Ok(body) => body,
                Err(e) if page == 0 => return Err(e),
                Err(e) => {
                    warn!("Stopping at result page {} for {:?}: {}", page, term, e);
                    break;
                }
            };

            let urls: Vec<String> = extract_image_urls(&body)
                .into_iter()
                .filter(|url| seen_urls.insert(url.clone()))
                .collect();
            if urls.is_empty() {
                debug!("No new image URLs on page {} for {:?}", page, term);
                break;
            }

            for url in urls {
                if saved >= max_num {
                    break;
                }
                match self.download(&url, dest, next_index) {
                    Ok(Some(path)) => {
                        debug!("Saved {} as {:?}", url, path);
                        saved += 1;
                        next_index += 1;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Failed to download {}: {}", url, e),
                }
            }
        }

        info!("Downloaded {} images for {:?}", saved, term);
        Ok(saved)
    }
}

/// Extension to store downloaded bytes under, sniffed from the content
fn file_extension_for(bytes: &[u8]) -> Option<&'static str> {
    if bytes.is_empty() {
        return None;
    }
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::Bmp => Some("bmp"),
        _ => None,
    }
}

/// One past the largest numeric file stem in `dir`, starting at 1
fn next_file_index(dir: &Path) -> io::Result<usize> {
    let mut max_index = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let index = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<usize>().ok());
        if let Some(index) = index {
            max_index = max_index.max(index);
        }
    }
    Ok(max_index.saturating_add(1))
}
