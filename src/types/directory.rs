use std::cmp::Ordering;
use std::io::{Read, Write};

use crate::codec::{self, ObjectType};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::types::{DirentType, Descriptor};

/// one row of a directory listing.
///
/// the content object size lives here rather than in the header object: a
/// fetcher then knows how many body bytes to expect before requesting an
/// object, and headers stay shareable across files whose content differs.
/// entries are built during ingestion and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub dirent_type: DirentType,

    /// target path, non-empty only for symlinks
    pub link_target: String,

    pub header_digest: Digest,
    pub header_size: u64,

    /// content object, present only for regular files and directories
    pub object_digest: Option<Digest>,
    pub object_size: u64,

    /// rollups copied from the referenced directory's descriptor
    pub num_sub_objects: u32,
    pub sub_objects_size: u64,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.dirent_type == DirentType::Directory
    }

    /// descriptor for this entry's header object
    pub fn header_descriptor(&self) -> Descriptor {
        Descriptor::new(
            self.header_digest.clone(),
            self.header_size,
            ObjectType::Header,
        )
    }

    /// descriptor for this entry's content object, if it has one
    pub fn object_descriptor(&self) -> Option<Descriptor> {
        let digest = self.object_digest.as_ref()?;

        let object_type = match self.dirent_type {
            DirentType::Directory => ObjectType::Directory,
            DirentType::Regular => ObjectType::File,
            _ => return None,
        };

        Some(
            Descriptor::new(digest.clone(), self.object_size, object_type)
                .with_sub_objects(self.num_sub_objects, self.sub_objects_size),
        )
    }

    pub fn marshal<W: Write>(&self, w: &mut W) -> Result<()> {
        codec::write_bytes(w, self.name.as_bytes(), "entry name")?;
        w.write_all(&[self.dirent_type.tag()])?;
        codec::write_bytes(w, self.link_target.as_bytes(), "link target")?;
        self.header_digest.marshal(w)?;
        codec::write_u64(w, self.header_size)?;
        Digest::marshal_opt(self.object_digest.as_ref(), w)?;
        codec::write_u64(w, self.object_size)?;
        codec::write_u32(w, self.num_sub_objects)?;
        codec::write_u64(w, self.sub_objects_size)?;
        Ok(())
    }

    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        let name = String::from_utf8_lossy(&codec::read_bytes(r)?).into_owned();
        let dirent_type = DirentType::from_tag(codec::read_u8(r)?);
        let link_target = String::from_utf8_lossy(&codec::read_bytes(r)?).into_owned();
        let header_digest = Digest::unmarshal(r)?;
        let header_size = codec::read_u64(r)?;
        let object_digest = Digest::unmarshal_opt(r)?;
        let object_size = codec::read_u64(r)?;
        let num_sub_objects = codec::read_u32(r)?;
        let sub_objects_size = codec::read_u64(r)?;

        Ok(Self {
            name,
            dirent_type,
            link_target,
            header_digest,
            header_size,
            object_digest,
            object_size,
            num_sub_objects,
            sub_objects_size,
        })
    }
}

/// validate an entry name: non-empty, no separator, no nul, not . or ..
pub fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidEntryName("empty name".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidEntryName(format!("name contains '/': {name}")));
    }
    if name.contains('\0') {
        return Err(Error::InvalidEntryName(format!(
            "name contains null byte: {name}"
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidEntryName(format!("reserved name: {name}")));
    }
    Ok(())
}

/// canonical entry order: directories before everything else, each group
/// sorted ascending by name bytes. any other order changes the directory
/// digest, so two logically equal directories must sort identically.
pub fn entry_order(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.as_bytes().cmp(b.name.as_bytes()),
    }
}

/// a directory object: canonically ordered list of entries
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Directory(Vec<DirectoryEntry>);

impl Directory {
    /// build a directory, validating names and sorting entries into
    /// canonical order
    pub fn new(mut entries: Vec<DirectoryEntry>) -> Result<Self> {
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }
        entries.sort_by(entry_order);
        Ok(Self(entries))
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// look up an entry by name
    pub fn get(&self, name: &str) -> Option<&DirectoryEntry> {
        self.0.iter().find(|e| e.name == name)
    }

    /// total number of objects transitively referenced by this directory:
    /// one header per entry, plus the content object and its own subtree
    /// for regular files and subdirectories
    pub fn total_sub_objects(&self) -> u32 {
        let mut count = self.0.len() as u32;
        for entry in &self.0 {
            if entry.dirent_type.has_object() {
                count += 1 + entry.num_sub_objects;
            }
        }
        count
    }

    /// total size in bytes of objects transitively referenced by this
    /// directory
    pub fn total_sub_objects_size(&self) -> u64 {
        self.0
            .iter()
            .map(|e| e.header_size + e.object_size + e.sub_objects_size)
            .sum()
    }

    /// descriptors of every object this directory references directly
    pub fn dependencies(&self) -> Vec<Descriptor> {
        let mut deps = Vec::with_capacity(self.0.len() * 2);
        for entry in &self.0 {
            deps.push(entry.header_descriptor());
            if let Some(desc) = entry.object_descriptor() {
                deps.push(desc);
            }
        }
        deps
    }

    /// marshal as `u32 count · count × entry`, entries pre-sorted
    pub fn marshal<W: Write>(&self, w: &mut W) -> Result<()> {
        codec::write_u32(w, self.0.len() as u32)?;
        for entry in &self.0 {
            entry.marshal(w)?;
        }
        Ok(())
    }

    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        let count = codec::read_u32(r)?;

        let mut entries = Vec::new();
        for _ in 0..count {
            entries.push(DirectoryEntry::unmarshal(r)?);
        }

        Ok(Self(entries))
    }
}
