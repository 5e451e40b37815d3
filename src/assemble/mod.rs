//! Turns downloaded pages into the final artifact
//!
//! Pages are ordered by index no matter which order they finished in.
//! Failed pages are listed in the report and left out of the artifact.

pub mod naming;
pub mod pdf;

use crate::pipeline::PageResults;
use naming::{create_unique_file, image_name};
use pdf::{DocumentInfo, PdfBuilder};
use serde_json::Value;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Page {page} is outside 1..={total}")]
    PageOutOfRange { page: u32, total: usize },

    #[error("Payload is not a JPEG image")]
    NotJpeg,

    #[error("No page was downloaded successfully")]
    NoPages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One numbered JPEG per page in the target directory
    Images,
    /// One PDF named after the title in the target directory
    Pdf,
}

/// Where and under what name the book is written
#[derive(Debug, Clone)]
pub struct AssemblyTarget {
    pub dir: PathBuf,
    pub title: String,
    pub metadata: Value,
    /// Write `metadata.json` next to the images
    pub save_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Images { dir: PathBuf, files: Vec<PathBuf> },
    Document { path: PathBuf, pages: usize },
    /// No page made it into an artifact and nothing was written
    Empty,
}

#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub artifact: Artifact,
    /// Pages present in the artifact
    pub included: usize,
    /// `(index, reason)` for every page left out, by index
    pub failures: Vec<(u32, String)>,
}

/// Write the successful pages of `results` in index order
pub fn assemble(
    results: PageResults,
    mode: OutputMode,
    target: &AssemblyTarget,
) -> Result<AssemblyReport, AssembleError> {
    let total = results.len();
    let mut failures = results.failures();
    let pages = results.into_sorted();

    let report = match mode {
        OutputMode::Images => {
            // Validate every name before touching the disk
            let mut named = Vec::with_capacity(pages.len());
            for page in pages.iter().filter(|p| p.is_success()) {
                named.push((image_name(total, page.index)?, page));
            }
            if named.is_empty() {
                warn!(excluded = failures.len(), "No usable page, images not written");
                return Ok(AssemblyReport {
                    artifact: Artifact::Empty,
                    included: 0,
                    failures,
                });
            }

            let mut files = Vec::with_capacity(named.len());
            for (name, page) in named {
                let path = target.dir.join(name);
                fs::write(&path, &page.payload)?;
                debug!(index = page.index, path = %path.display(), "Wrote page image");
                files.push(path);
            }

            if target.save_metadata {
                let file = fs::File::create(target.dir.join(METADATA_FILE))?;
                let mut writer = BufWriter::new(file);
                serde_json::to_writer_pretty(&mut writer, &target.metadata)?;
                writer.flush()?;
            }

            AssemblyReport {
                included: files.len(),
                artifact: Artifact::Images {
                    dir: target.dir.clone(),
                    files,
                },
                failures,
            }
        }
        OutputMode::Pdf => {
            let mut builder = PdfBuilder::new();
            for page in pages.iter().filter(|p| p.is_success()) {
                match builder.add_jpeg(&page.payload) {
                    Ok(()) => {}
                    Err(AssembleError::NotJpeg) => {
                        warn!(index = page.index, "Page is not a JPEG, leaving it out");
                        failures.push((page.index, AssembleError::NotJpeg.to_string()));
                    }
                    Err(e) => return Err(e),
                }
            }
            failures.sort_by_key(|(index, _)| *index);

            if builder.page_count() == 0 {
                warn!(excluded = failures.len(), "No usable page, PDF not written");
                return Ok(AssemblyReport {
                    artifact: Artifact::Empty,
                    included: 0,
                    failures,
                });
            }

            let included = builder.page_count();
            let info = DocumentInfo::from_metadata(&target.title, &target.metadata);
            let (path, file) = create_unique_file(&target.dir, &target.title, "pdf")?;
            if let Err(e) = builder.write_to(&info, file) {
                let _ = fs::remove_file(&path);
                return Err(e);
            }

            AssemblyReport {
                artifact: Artifact::Document {
                    path,
                    pages: included,
                },
                included,
                failures,
            }
        }
    };

    info!(
        included = report.included,
        excluded = report.failures.len(),
        "Book assembled"
    );
    Ok(report)
}
