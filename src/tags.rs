use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;

use crate::codec;
use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::repo::Repository;
use crate::types::Descriptor;

/// tag names: leading word character, then up to 127 of word/dot/dash
fn valid_tag_name(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return false;
    }

    if name.len() > 128 {
        return false;
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// read the descriptor a tag points at
pub fn get_tag(repo: &Repository, name: &str) -> Result<Descriptor> {
    let path = repo.tags_path().join(name);
    let mut file = match fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NoSuchTag(name.to_string()))
        }
        Err(e) => return Err(Error::Io { path, source: e }),
    };

    Descriptor::unmarshal(&mut file)
}

/// point a tag at a descriptor, creating or replacing it
pub fn set_tag(repo: &Repository, name: &str, desc: &Descriptor) -> Result<()> {
    if !valid_tag_name(name) {
        return Err(Error::InvalidTag(name.to_string()));
    }

    let path = repo.tags_path().join(name);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)
        .with_path(&path)?;

    desc.marshal(&mut file)?;
    Ok(())
}

/// list all tag names
pub fn list_tags(repo: &Repository) -> Result<Vec<String>> {
    let dir = repo.tags_path();
    let mut tags = Vec::new();

    for entry in fs::read_dir(&dir).with_path(&dir)? {
        let entry = entry.with_path(&dir)?;
        tags.push(entry.file_name().to_string_lossy().into_owned());
    }

    tags.sort();
    Ok(tags)
}

/// remove a tag
pub fn remove_tag(repo: &Repository, name: &str) -> Result<()> {
    let path = repo.tags_path().join(name);
    fs::remove_file(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NoSuchTag(name.to_string())
        } else {
            Error::Io { path, source: e }
        }
    })
}

/// resolve a reference string: a tag name first, falling back to parsing a
/// hex-encoded digest
pub fn resolve_ref(repo: &Repository, reference: &str) -> Result<Digest> {
    match get_tag(repo, reference) {
        Ok(desc) => Ok(desc.digest().clone()),
        Err(Error::NoSuchTag(_)) => Digest::from_hex(reference),
        Err(e) => Err(e),
    }
}

/// marshal a name → descriptor map as
/// `u32 count · count × (u32 name_len · name · descriptor)`
pub fn marshal_tag_descriptors<W: Write>(
    w: &mut W,
    tags: &BTreeMap<String, Descriptor>,
) -> Result<()> {
    codec::write_u32(w, tags.len() as u32)?;

    for (name, desc) in tags {
        codec::write_u32(w, name.len() as u32)?;
        w.write_all(name.as_bytes())?;
        desc.marshal(w)?;
    }

    Ok(())
}

pub fn unmarshal_tag_descriptors<R: Read>(r: &mut R) -> Result<BTreeMap<String, Descriptor>> {
    let count = codec::read_u32(r)?;

    let mut tags = BTreeMap::new();
    for _ in 0..count {
        let name_len = codec::read_u32(r)? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;

        let desc = Descriptor::unmarshal(r)?;
        tags.insert(String::from_utf8_lossy(&name).into_owned(), desc);
    }

    Ok(tags)
}

/// every tag with the descriptor it points at
pub fn all_tag_descriptors(repo: &Repository) -> Result<BTreeMap<String, Descriptor>> {
    let mut tags = BTreeMap::new();
    for name in list_tags(repo)? {
        let desc = get_tag(repo, &name)?;
        tags.insert(name, desc);
    }
    Ok(tags)
}
