use std::fs::{self, File, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use nix::sys::stat::utimes;
use nix::sys::time::{TimeVal, TimeValLike};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{git_object_hash, Hash};

/// intermediate build root: the directory tree where realizations are staged
///
/// layout under the root:
///   `KNOWN/<id>`    literal blobs, written byte-exact
///   `TREE/<id>`     finished tree realizations
///   `ACTION/<id>`   action working directories post-execution
pub struct BuildRoot {
    root: PathBuf,
}

impl BuildRoot {
    /// create (or reuse) the intermediate root and its KNOWN area
    pub fn create(path: &Path) -> Result<Self> {
        let root = crate::fs::absolute(path)?;
        fs::create_dir_all(root.join("KNOWN")).with_path(&root)?;
        Ok(Self { root })
    }

    /// root path
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// canonical path of a stored blob
    pub fn known_path(&self, id: &str) -> PathBuf {
        self.root.join("KNOWN").join(id)
    }

    /// canonical path of a stored blob, failing when the id is absent
    pub fn stored_blob(&self, id: &str) -> Result<PathBuf> {
        let path = self.known_path(id);
        if !path.is_file() {
            return Err(Error::UnknownBlob(id.to_string()));
        }
        Ok(path)
    }

    /// canonical path of a tree realization
    pub fn tree_path(&self, id: &str) -> PathBuf {
        self.root.join("TREE").join(id)
    }

    /// composition directory for a tree under construction
    pub fn tree_tmp_path(&self, id: &str) -> PathBuf {
        self.root.join("TREE").join(format!("{id}.tmp"))
    }

    /// canonical path of an action working directory
    pub fn action_path(&self, id: &str) -> PathBuf {
        self.root.join("ACTION").join(id)
    }

    /// store a byte string under its git object hash, returning the canonical path
    ///
    /// existing files are reused without rewriting; otherwise the content goes
    /// through a per-pid temporary sibling, is flushed, made read-only, gets
    /// epoch timestamps and is renamed into place.
    pub fn add_object(&self, kind: &str, content: &[u8]) -> Result<(Hash, PathBuf)> {
        let hash = git_object_hash(kind, content);
        let target = self.known_path(&hash.to_hex());
        if target.exists() {
            return Ok((hash, target));
        }

        let tmp = self.known_path(&format!("{}.{}", hash.to_hex(), std::process::id()));
        {
            let mut file = File::create(&tmp).with_path(&tmp)?;
            file.write_all(content).with_path(&tmp)?;
            file.set_permissions(Permissions::from_mode(0o444))
                .with_path(&tmp)?;
            file.sync_all().with_path(&tmp)?;
        }
        let epoch = TimeVal::seconds(0);
        utimes(&tmp, &epoch, &epoch).map_err(|errno| Error::Io {
            path: tmp.clone(),
            source: std::io::Error::from_raw_os_error(errno as i32),
        })?;
        fs::rename(&tmp, &target).with_path(&target)?;
        Ok((hash, target))
    }

    /// store a literal blob (the KNOWN artifact form)
    pub fn add_blob(&self, content: &[u8]) -> Result<(Hash, PathBuf)> {
        self.add_object("blob", content)
    }
}
