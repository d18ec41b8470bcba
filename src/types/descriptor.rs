use std::io::{Read, Write};

use crate::codec::{self, ObjectType};
use crate::digest::Digest;
use crate::error::Result;

/// names an object and summarizes its subtree.
///
/// `size` counts the object body only, excluding the one-byte type tag. for
/// directories (and applications) `num_sub_objects`/`sub_objects_size` roll
/// up the full transitive closure of referenced objects; for files and
/// headers both are zero. the rollups let a transfer peer account for a
/// whole skipped subtree from a single descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    digest: Digest,
    size: u64,
    object_type: ObjectType,
    num_sub_objects: u32,
    sub_objects_size: u64,
}

impl Descriptor {
    pub fn new(digest: Digest, size: u64, object_type: ObjectType) -> Self {
        Self {
            digest,
            size,
            object_type,
            num_sub_objects: 0,
            sub_objects_size: 0,
        }
    }

    pub fn with_sub_objects(mut self, num: u32, size: u64) -> Self {
        self.num_sub_objects = num;
        self.sub_objects_size = size;
        self
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn num_sub_objects(&self) -> u32 {
        self.num_sub_objects
    }

    pub fn sub_objects_size(&self) -> u64 {
        self.sub_objects_size
    }

    /// marshal as `digest · u64 size · u8 type · u32 num_sub · u64 sub_size`
    pub fn marshal<W: Write>(&self, w: &mut W) -> Result<()> {
        self.digest.marshal(w)?;
        codec::write_u64(w, self.size)?;
        self.object_type.marshal(w)?;
        codec::write_u32(w, self.num_sub_objects)?;
        codec::write_u64(w, self.sub_objects_size)?;
        Ok(())
    }

    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        let digest = Digest::unmarshal(r)?;
        let size = codec::read_u64(r)?;
        let object_type = ObjectType::unmarshal(r)?;
        let num_sub_objects = codec::read_u32(r)?;
        let sub_objects_size = codec::read_u64(r)?;

        Ok(Self {
            digest,
            size,
            object_type,
            num_sub_objects,
            sub_objects_size,
        })
    }
}
