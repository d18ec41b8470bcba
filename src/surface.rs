//! lookup interfaces for a userspace filesystem surface.
//!
//! the mount itself lives outside this crate; it only needs to resolve
//! paths against a stored application and derive stable inode numbers for
//! the entries it exposes.

use crate::digest::{digest_of, Digest, DigestAlgorithm};
use crate::error::{Error, Result};
use crate::object::{get_application, get_directory, get_header};
use crate::repo::Repository;
use crate::types::{Directory, DirectoryEntry, DirentType, Header};

/// a resolved filesystem entry: the directory row plus its header
#[derive(Clone, Debug)]
pub struct ResolvedEntry {
    pub entry: DirectoryEntry,
    pub header: Header,
    pub inode: u64,
}

/// read-only view over the tree pinned by an application object
pub struct TreeView<'r> {
    repo: &'r Repository,
    root: ResolvedEntry,
}

impl<'r> TreeView<'r> {
    /// open the tree for the application with the given digest
    pub fn open(repo: &'r Repository, app_digest: &Digest) -> Result<Self> {
        let app = get_application(repo, app_digest)?;
        let header = get_header(repo, &app.rootfs.header.digest)?;

        let entry = DirectoryEntry {
            name: "/".to_string(),
            dirent_type: DirentType::Directory,
            link_target: String::new(),
            header_digest: app.rootfs.header.digest.clone(),
            header_size: app.rootfs.header.size,
            object_digest: Some(app.rootfs.directory.digest.clone()),
            object_size: app.rootfs.directory.size,
            num_sub_objects: app.rootfs.directory.num_sub_objects,
            sub_objects_size: app.rootfs.directory.sub_objects_size,
        };
        let inode = derive_inode(&entry, 0);

        Ok(Self {
            repo,
            root: ResolvedEntry {
                entry,
                header,
                inode,
            },
        })
    }

    pub fn root(&self) -> &ResolvedEntry {
        &self.root
    }

    /// list the directory behind a resolved entry
    pub fn read_dir(&self, dir: &ResolvedEntry) -> Result<Directory> {
        let digest = dir
            .entry
            .object_digest
            .as_ref()
            .ok_or_else(|| Error::PathNotFound(dir.entry.name.clone()))?;
        get_directory(self.repo, digest)
    }

    /// resolve a `/`-separated path relative to the root
    pub fn resolve(&self, path: &str) -> Result<ResolvedEntry> {
        let mut current = self.root.clone();

        for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            if !current.entry.is_dir() {
                return Err(Error::PathNotFound(path.to_string()));
            }

            let dir = self.read_dir(&current)?;
            let entry = dir
                .get(component)
                .ok_or_else(|| Error::PathNotFound(path.to_string()))?
                .clone();

            let header = get_header(self.repo, &entry.header_digest)?;
            let inode = derive_inode(&entry, current.inode);

            current = ResolvedEntry {
                entry,
                header,
                inode,
            };
        }

        Ok(current)
    }
}

/// derive a stable inode number for an entry.
///
/// the number is the first 8 bytes (little-endian) of the SHA-512/256 of
/// `header_digest · object_digest · link_target · parent_inode`, where the
/// parent inode participates only for directories. stable for a process
/// lifetime and unique per that tuple.
pub fn derive_inode(entry: &DirectoryEntry, parent_inode: u64) -> u64 {
    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(entry.header_digest.as_bytes());
    if let Some(object) = &entry.object_digest {
        buf.extend_from_slice(object.as_bytes());
    }
    buf.extend_from_slice(entry.link_target.as_bytes());
    if entry.is_dir() {
        buf.extend_from_slice(&parent_inode.to_le_bytes());
    }

    let digest = digest_of(DigestAlgorithm::Sha512_256, &buf);
    let mut ino = [0u8; 8];
    ino.copy_from_slice(&digest.as_bytes()[1..9]);
    u64::from_le_bytes(ino)
}
