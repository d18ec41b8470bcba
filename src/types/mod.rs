mod application;
mod descriptor;
mod directory;
mod header;
mod xattrs;

pub use application::{Application, Rootfs, RootfsDirectory, RootfsHeader};
pub use descriptor::Descriptor;
pub use directory::{entry_order, validate_entry_name, Directory, DirectoryEntry};
pub use header::{DirentType, Header, Mode};
pub use xattrs::{Xattr, Xattrs};
