use std::{
    fs::{self, File},
    io::{self, BufWriter, LineWriter, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use walkdir::WalkDir;

// === FsError === //

#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to stat {}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("failed to walk directory {}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to remove file {}", path.display())]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove directory {}", path.display())]
    RemoveDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {} to {}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to flush buffered writes")]
    Flush(#[source] io::Error),

    #[error("failed to sync file to disk")]
    Sync(#[source] io::Error),
}

// === Directories === //

/// Removes `path` and everything below it, deepest entries first.
///
/// Symbolic links are removed, never followed. The first failure aborts the deletion, leaving
/// whatever was not yet removed in place.
pub fn delete_directory(path: impl AsRef<Path>) -> Result<(), FsError> {
    // Normalizing through `components` drops trailing separators.
    let path = path.as_ref().components().collect::<PathBuf>();

    let meta = fs::symlink_metadata(&path).map_err(|source| FsError::Metadata {
        path: path.clone(),
        source,
    })?;

    if !meta.is_dir() {
        return Err(FsError::NotADirectory { path });
    }

    for entry in WalkDir::new(&path).contents_first(true).follow_links(false) {
        let entry = entry.map_err(|source| FsError::Walk {
            path: source.path().unwrap_or(&path).to_path_buf(),
            source,
        })?;

        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path()).map_err(|source| FsError::RemoveDir {
                path: entry.path().to_path_buf(),
                source,
            })?;
        } else {
            fs::remove_file(entry.path()).map_err(|source| FsError::RemoveFile {
                path: entry.path().to_path_buf(),
                source,
            })?;
        }
    }

    Ok(())
}

// === Files === //

/// Atomically renames `from` to `to`, replacing `to` if it exists.
pub fn rename_with_overwrite(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<(), FsError> {
    let (from, to) = (from.as_ref(), to.as_ref());

    fs::rename(from, to).map_err(|source| FsError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// A writer backed by a [`File`] whose contents can be forced to disk.
pub trait FileBacked: Write {
    fn backing_file(&self) -> &File;
}

impl FileBacked for File {
    fn backing_file(&self) -> &File {
        self
    }
}

impl FileBacked for BufWriter<File> {
    fn backing_file(&self) -> &File {
        self.get_ref()
    }
}

impl FileBacked for LineWriter<File> {
    fn backing_file(&self) -> &File {
        self.get_ref()
    }
}

/// Flushes buffered writes and waits for the file's contents to reach the disk.
pub fn flush_file_data(file: &mut impl FileBacked) -> Result<(), FsError> {
    file.flush().map_err(FsError::Flush)?;
    file.backing_file().sync_all().map_err(FsError::Sync)
}
