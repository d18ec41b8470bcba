//! registry of application digests currently surfaced through a mount.
//!
//! each entry is an empty file named by the hex digest under `refs/mounts/`.
//! a mount adapter registers the application it exposes so its objects are
//! visibly referenced while the mount lives.

use std::fs;

use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::repo::Repository;

/// list registered mount digests
pub fn list_mounts(repo: &Repository) -> Result<Vec<Digest>> {
    let dir = repo.mounts_path();
    let mut digests = Vec::new();

    for entry in fs::read_dir(&dir).with_path(&dir)? {
        let entry = entry.with_path(&dir)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        digests.push(Digest::from_hex(&name)?);
    }

    digests.sort();
    Ok(digests)
}

/// register a mounted application digest
pub fn add_mount(repo: &Repository, digest: &Digest) -> Result<()> {
    let path = repo.mounts_path().join(digest.to_hex());
    fs::write(&path, []).with_path(&path)?;
    Ok(())
}

/// unregister a mounted application digest
pub fn remove_mount(repo: &Repository, digest: &Digest) -> Result<()> {
    let path = repo.mounts_path().join(digest.to_hex());
    fs::remove_file(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ObjectNotFound(digest.clone())
        } else {
            Error::Io { path, source: e }
        }
    })
}
