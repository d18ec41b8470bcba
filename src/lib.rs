//! arbor - content-addressed object store for container root filesystems
//!
//! every file, symlink header, directory, and application manifest is an
//! immutable object named by a digest of its body. directories reference
//! headers and content objects by digest, so a whole rootfs collapses to a
//! single root digest that transitively pins everything below it.
//!
//! # Core concepts
//!
//! - **Header**: timestamp-free metadata record, shared by every entry with
//!   equal mode/ownership/xattrs
//! - **Directory**: canonically ordered entry list referencing headers and
//!   content objects by digest
//! - **Application**: root object pinning a rootfs header and directory
//! - **Tag**: mutable name for an application descriptor
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use arbor::{ops, Repository};
//!
//! let repo = Repository::init(Path::new("/srv/store")).unwrap();
//! let desc = ops::store_and_tag(&repo, Path::new("/var/rootfs"), "v1").unwrap();
//! println!("stored {}", desc.digest());
//! ```

mod codec;
mod config;
mod digest;
mod error;
mod repo;

pub mod fs;
pub mod mounts;
pub mod object;
pub mod ops;
pub mod remote;
pub mod surface;
pub mod tags;
pub mod transfer;
pub mod types;

pub use codec::ObjectType;
pub use config::{Config, Remote};
pub use digest::{digest_of, Digest, DigestAlgorithm, Digester, DEFAULT_ALGORITHM};
pub use error::{Error, IoResultExt, Result};
pub use repo::{RepoLock, Repository};
pub use types::{
    Application, Descriptor, Directory, DirectoryEntry, DirentType, Header, Mode, Xattr, Xattrs,
};
