//! host metadata collection behind an abstract provider.
//!
//! the ingestion walker only ever sees [`Header`] values and symlink
//! targets, so tests (or platforms with unusual metadata sources) can swap
//! the provider without touching the walker.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::libc;

use crate::error::{Error, IoResultExt, Result};
use crate::types::{Header, Mode, Xattr, Xattrs};

/// source of filesystem entry metadata for ingestion
pub trait MetadataProvider {
    /// header for the entry at `path`, without following symlinks
    fn header(&self, path: &Path) -> Result<Header>;

    /// symlink target for the entry at `path`
    fn read_link(&self, path: &Path) -> Result<String>;
}

/// provider backed by lstat and the host xattr interface
#[derive(Clone, Copy, Debug, Default)]
pub struct HostMetadata;

impl MetadataProvider for HostMetadata {
    fn header(&self, path: &Path) -> Result<Header> {
        let meta = fs::symlink_metadata(path).with_path(path)?;

        Ok(Header {
            mode: Mode::from_host(meta.mode()),
            rdev: meta.rdev() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            xattrs: read_xattrs(path)?,
        })
    }

    fn read_link(&self, path: &Path) -> Result<String> {
        let target = fs::read_link(path).with_path(path)?;
        Ok(target.to_string_lossy().into_owned())
    }
}

/// read all extended attributes from a path, sorted by key
pub fn read_xattrs(path: &Path) -> Result<Xattrs> {
    let names: Vec<String> = match xattr::list(path) {
        Ok(iter) => iter.map(|n| n.to_string_lossy().into_owned()).collect(),
        Err(e) => {
            // no xattr support on this filesystem is not an error
            if e.raw_os_error() == Some(libc::ENOTSUP)
                || e.raw_os_error() == Some(libc::EOPNOTSUPP)
            {
                return Ok(Xattrs::empty());
            }
            return Err(Error::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let mut attrs = Vec::with_capacity(names.len());
    for name in names {
        match xattr::get(path, &name) {
            Ok(Some(value)) => attrs.push(Xattr::new(name, value)),
            // attribute removed between list and get
            Ok(None) => {}
            Err(e) if e.raw_os_error() == Some(libc::ENODATA) => {}
            Err(e) => {
                return Err(Error::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    Ok(Xattrs::new(attrs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DirentType;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use tempfile::tempdir;

    #[test]
    fn test_header_for_regular_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.txt");
        fs::write(&path, "content").unwrap();
        fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let header = HostMetadata.header(&path).unwrap();
        assert_eq!(header.mode.dirent_type(), DirentType::Regular);
        assert_eq!(header.mode.perm(), 0o640);
        assert_eq!(header.rdev, 0);
    }

    #[test]
    fn test_header_for_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub");
        fs::create_dir(&path).unwrap();

        let header = HostMetadata.header(&path).unwrap();
        assert_eq!(header.mode.dirent_type(), DirentType::Directory);
    }

    #[test]
    fn test_header_for_symlink_not_followed() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        fs::write(&target, "x").unwrap();
        symlink(&target, &link).unwrap();

        let header = HostMetadata.header(&link).unwrap();
        assert_eq!(header.mode.dirent_type(), DirentType::Link);

        let read = HostMetadata.read_link(&link).unwrap();
        assert_eq!(read, target.to_string_lossy());
    }

    #[test]
    fn test_equal_files_equal_headers() {
        let dir = tempdir().unwrap();
        let p1 = dir.path().join("a");
        let p2 = dir.path().join("b");
        fs::write(&p1, "one").unwrap();
        fs::write(&p2, "two completely different").unwrap();
        fs::set_permissions(&p1, std::fs::Permissions::from_mode(0o644)).unwrap();
        fs::set_permissions(&p2, std::fs::Permissions::from_mode(0o644)).unwrap();

        // size plays no part in the header, so these must be equal
        let h1 = HostMetadata.header(&p1).unwrap();
        let h2 = HostMetadata.header(&p2).unwrap();
        assert_eq!(h1, h2);
    }
}
