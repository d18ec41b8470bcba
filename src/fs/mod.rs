mod meta;

pub use meta::{read_xattrs, HostMetadata, MetadataProvider};
