use std::io::{Read, Write};

use crate::codec::{self, ObjectType};
use crate::digest::Digest;
use crate::error::Result;
use crate::types::Descriptor;

/// root object for an application container: pins the rootfs directory and
/// its header. resolving a tag yields the descriptor of one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
    pub rootfs: Rootfs,
}

/// rootfs header + directory reference pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rootfs {
    pub header: RootfsHeader,
    pub directory: RootfsDirectory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootfsHeader {
    pub digest: Digest,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootfsDirectory {
    pub digest: Digest,
    pub size: u64,
    pub num_sub_objects: u32,
    pub sub_objects_size: u64,
}

impl Application {
    pub fn new(header: Descriptor, directory: Descriptor) -> Self {
        Self {
            rootfs: Rootfs {
                header: RootfsHeader {
                    digest: header.digest().clone(),
                    size: header.size(),
                },
                directory: RootfsDirectory {
                    digest: directory.digest().clone(),
                    size: directory.size(),
                    num_sub_objects: directory.num_sub_objects(),
                    sub_objects_size: directory.sub_objects_size(),
                },
            },
        }
    }

    /// descriptors of the two objects this application references
    pub fn dependencies(&self) -> Vec<Descriptor> {
        vec![self.header_descriptor(), self.directory_descriptor()]
    }

    pub fn header_descriptor(&self) -> Descriptor {
        Descriptor::new(
            self.rootfs.header.digest.clone(),
            self.rootfs.header.size,
            ObjectType::Header,
        )
    }

    pub fn directory_descriptor(&self) -> Descriptor {
        Descriptor::new(
            self.rootfs.directory.digest.clone(),
            self.rootfs.directory.size,
            ObjectType::Directory,
        )
        .with_sub_objects(
            self.rootfs.directory.num_sub_objects,
            self.rootfs.directory.sub_objects_size,
        )
    }

    /// rollup count for a descriptor naming this application: the header,
    /// the directory, and everything below the directory
    pub fn total_sub_objects(&self) -> u32 {
        2 + self.rootfs.directory.num_sub_objects
    }

    pub fn total_sub_objects_size(&self) -> u64 {
        self.rootfs.header.size
            + self.rootfs.directory.size
            + self.rootfs.directory.sub_objects_size
    }

    pub fn marshal<W: Write>(&self, w: &mut W) -> Result<()> {
        self.rootfs.header.digest.marshal(w)?;
        codec::write_u64(w, self.rootfs.header.size)?;
        self.rootfs.directory.digest.marshal(w)?;
        codec::write_u64(w, self.rootfs.directory.size)?;
        codec::write_u32(w, self.rootfs.directory.num_sub_objects)?;
        codec::write_u64(w, self.rootfs.directory.sub_objects_size)?;
        Ok(())
    }

    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        let header_digest = Digest::unmarshal(r)?;
        let header_size = codec::read_u64(r)?;
        let directory_digest = Digest::unmarshal(r)?;
        let directory_size = codec::read_u64(r)?;
        let num_sub_objects = codec::read_u32(r)?;
        let sub_objects_size = codec::read_u64(r)?;

        Ok(Self {
            rootfs: Rootfs {
                header: RootfsHeader {
                    digest: header_digest,
                    size: header_size,
                },
                directory: RootfsDirectory {
                    digest: directory_digest,
                    size: directory_size,
                    num_sub_objects,
                    sub_objects_size,
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{digest_of, DEFAULT_ALGORITHM};

    fn test_app() -> Application {
        Application::new(
            Descriptor::new(
                digest_of(DEFAULT_ALGORITHM, b"root header"),
                22,
                ObjectType::Header,
            ),
            Descriptor::new(
                digest_of(DEFAULT_ALGORITHM, b"root directory"),
                310,
                ObjectType::Directory,
            )
            .with_sub_objects(5, 4096),
        )
    }

    #[test]
    fn test_application_roundtrip() {
        let app = test_app();

        let mut buf = Vec::new();
        app.marshal(&mut buf).unwrap();

        let parsed = Application::unmarshal(&mut buf.as_slice()).unwrap();
        assert_eq!(app, parsed);
    }

    #[test]
    fn test_application_dependencies() {
        let app = test_app();
        let deps = app.dependencies();

        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].object_type(), ObjectType::Header);
        assert_eq!(deps[1].object_type(), ObjectType::Directory);
        assert_eq!(deps[1].num_sub_objects(), 5);
    }

    #[test]
    fn test_application_rollups() {
        let app = test_app();

        // header + directory + directory's own 5 sub-objects
        assert_eq!(app.total_sub_objects(), 7);
        assert_eq!(app.total_sub_objects_size(), 22 + 310 + 4096);
    }

    #[test]
    fn test_application_truncated() {
        let app = test_app();
        let mut buf = Vec::new();
        app.marshal(&mut buf).unwrap();
        buf.truncate(10);

        assert!(matches!(
            Application::unmarshal(&mut buf.as_slice()),
            Err(crate::Error::Truncated)
        ));
    }
}
