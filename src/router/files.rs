//! Filesystem access confined to a single root directory.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::http::response::StatusCode;

#[derive(Debug)]
pub enum FileError {
    /// Empty name, or one that names the root itself
    InvalidName,
    /// Name would resolve outside the root
    PathEscape,
    NotFound,
    PermissionDenied,
    Io(io::Error),
}

impl FileError {
    pub fn status(&self) -> StatusCode {
        match self {
            FileError::InvalidName => StatusCode::BadRequest,
            FileError::PathEscape | FileError::PermissionDenied => StatusCode::Forbidden,
            FileError::NotFound => StatusCode::NotFound,
            FileError::Io(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<io::Error> for FileError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FileError::NotFound,
            io::ErrorKind::PermissionDenied => FileError::PermissionDenied,
            _ => FileError::Io(e),
        }
    }
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::InvalidName => f.write_str("invalid file name"),
            FileError::PathEscape => f.write_str("path escapes the file root"),
            FileError::NotFound => f.write_str("file not found"),
            FileError::PermissionDenied => f.write_str("permission denied"),
            FileError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Reads and writes files under a canonicalized root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Canonicalizes `root`, which must exist and be a directory.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a raw request name to a path under the root without touching
    /// the filesystem.
    ///
    /// Rejects absolute names, `..` segments, backslashes and NUL bytes.
    /// Empty and `.` segments are skipped.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, FileError> {
        if name.is_empty() {
            return Err(FileError::InvalidName);
        }
        if name.starts_with('/') || name.contains(['\\', '\0']) {
            return Err(FileError::PathEscape);
        }

        let mut path = self.root.clone();
        let mut depth = 0;
        for segment in name.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(FileError::PathEscape),
                _ => {}
            }
            // A segment must be exactly one normal component on this platform.
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => path.push(segment),
                _ => return Err(FileError::PathEscape),
            }
            depth += 1;
        }

        if depth == 0 {
            return Err(FileError::InvalidName);
        }
        Ok(path)
    }

    /// Reads a regular file. Directories and other non-files are `NotFound`.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, FileError> {
        let path = self.resolve(name)?;

        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(FileError::NotFound);
        }
        self.confine(&path).await?;

        Ok(tokio::fs::read(&path).await?)
    }

    /// Creates or truncates a file with `data`.
    ///
    /// The parent directory must already exist inside the root. An existing
    /// target that is a symlink must also point inside the root.
    pub async fn write(&self, name: &str, data: &[u8]) -> Result<(), FileError> {
        let path = self.resolve(name)?;

        if let Some(parent) = path.parent() {
            self.confine(parent).await?;
        }
        if tokio::fs::symlink_metadata(&path).await.is_ok() {
            self.confine(&path).await?;
        }

        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn confine(&self, path: &Path) -> Result<(), FileError> {
        let canonical = tokio::fs::canonicalize(path).await?;
        if canonical.starts_with(&self.root) {
            Ok(())
        } else {
            Err(FileError::PathEscape)
        }
    }
}
