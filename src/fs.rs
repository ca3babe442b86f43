//! filesystem staging primitives

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};

/// absolute form of `path`, without requiring it to exist
pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_path(path)
}

/// stage the realization at `src` under the destination path `dest`
///
/// attempts a hard link, falling back to a symbolic link when hard linking
/// is not possible (directories, cross-device). parent directories are
/// created on demand. an existing destination is never overwritten.
pub fn link(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    match fs::hard_link(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(Error::DestinationExists(dest.to_path_buf()))
        }
        Err(_) => symlink(src, dest).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                Error::DestinationExists(dest.to_path_buf())
            } else {
                Error::Io {
                    path: dest.to_path_buf(),
                    source: e,
                }
            }
        }),
    }
}

/// publish a composed directory under its canonical name
///
/// the canonical path appears atomically; an empty composition is published
/// by creating the tmp directory first.
pub fn publish_dir(tmp: &Path, canonical: &Path) -> Result<()> {
    fs::create_dir_all(tmp).with_path(tmp)?;
    fs::rename(tmp, canonical).with_path(canonical)
}
