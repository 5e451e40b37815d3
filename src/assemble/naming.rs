//! Output file naming

use super::AssembleError;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// File name for `page` in a book of `total` pages, zero padded to the width
/// of `total` so names sort in page order
pub fn image_name(total: usize, page: u32) -> Result<String, AssembleError> {
    if page == 0 || page as usize > total {
        return Err(AssembleError::PageOutOfRange { page, total });
    }
    let width = total.to_string().len();
    Ok(format!("{:0width$}.jpg", page, width = width))
}

fn candidate(stem: &str, attempt: u32, extension: Option<&str>) -> String {
    let stem = if attempt == 0 {
        stem.to_string()
    } else {
        format!("{}({})", stem, attempt)
    };
    match extension {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Create `<stem>.<ext>` in `dir`, or the first free `<stem>(n).<ext>`
///
/// The file is opened with `create_new`, so an existing file is never
/// truncated even if another process races for the same name.
pub fn create_unique_file(dir: &Path, stem: &str, extension: &str) -> io::Result<(PathBuf, File)> {
    let mut attempt = 0u32;
    loop {
        let path = dir.join(candidate(stem, attempt, Some(extension)));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Create `<name>` under `parent`, or the first free `<name>(n)`
pub fn create_unique_dir(parent: &Path, name: &str) -> io::Result<PathBuf> {
    let mut attempt = 0u32;
    loop {
        let path = parent.join(candidate(name, attempt, None));
        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}
