//! Local object storage for product images. Uploaded files get a timestamped name
//! and are addressed by their `file://` URL, which the catalog stores verbatim.
//! An existing file is never overwritten.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use url::Url;

#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Copy `source` into the store and return its public URL.
    pub fn upload(&self, source: &Path) -> Result<String, ImageError> {
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(stored_name)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ImageError::MissingFileName(source.to_path_buf()))?;

        let copy_err = |e| ImageError::Copy(source.to_path_buf(), e);
        let mut src = File::open(source).map_err(copy_err)?;
        std::fs::create_dir_all(&self.root).map_err(|e| ImageError::CreateDir(self.root.clone(), e))?;
        let (dest, mut out) = claim(&self.root, Utc::now().timestamp_millis(), &file_name).map_err(copy_err)?;
        if let Err(e) = std::io::copy(&mut src, &mut out) {
            let _ = std::fs::remove_file(&dest);
            return Err(copy_err(e));
        }

        let absolute = dest
            .canonicalize()
            .map_err(|e| ImageError::Copy(source.to_path_buf(), e))?;
        let url = Url::from_file_path(&absolute).map_err(|()| ImageError::Url(absolute.clone()))?;
        tracing::debug!(source = %source.display(), url = %url, "image uploaded");
        Ok(url.to_string())
    }
}

/// Create `<stamp>-<name>`, or `<stamp>-<n>-<name>` when that is taken.
fn claim(root: &Path, stamp: i64, name: &str) -> std::io::Result<(PathBuf, File)> {
    let mut attempt = 0u32;
    loop {
        let candidate = match attempt {
            0 => root.join(format!("{stamp}-{name}")),
            n => root.join(format!("{stamp}-{n}-{name}")),
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Whitespace runs become a single `-`.
fn stored_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("-")
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image path has no usable file name: {0}")]
    MissingFileName(PathBuf),
    #[error("failed to create image directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("failed to store image {0}: {1}")]
    Copy(PathBuf, std::io::Error),
    #[error("cannot build a URL for {0}")]
    Url(PathBuf),
}
