use std::io::{Read, Write};

use crate::codec;
use crate::error::Result;

/// an extended attribute key-value pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Xattr {
    pub key: String,
    pub value: Vec<u8>,
}

impl Xattr {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// extended attribute list, held sorted ascending by key so that headers
/// with equal attributes encode byte-identically
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Xattrs(Vec<Xattr>);

impl Xattrs {
    pub fn new(mut attrs: Vec<Xattr>) -> Self {
        attrs.sort_by(|a, b| a.key.as_bytes().cmp(b.key.as_bytes()));
        Self(attrs)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn entries(&self) -> &[Xattr] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0
            .binary_search_by(|x| x.key.as_bytes().cmp(key.as_bytes()))
            .ok()
            .map(|i| self.0[i].value.as_slice())
    }

    /// marshal as `u16 count · count × (u16 key_len · key · u16 val_len · val)`
    pub fn marshal<W: Write>(&self, w: &mut W) -> Result<()> {
        let count = u16::try_from(self.0.len()).map_err(|_| crate::Error::Oversize {
            what: "xattr list",
            len: self.0.len(),
        })?;
        codec::write_u16(w, count)?;

        for xattr in &self.0 {
            codec::write_bytes(w, xattr.key.as_bytes(), "xattr key")?;
            codec::write_bytes(w, &xattr.value, "xattr value")?;
        }

        Ok(())
    }

    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        let count = codec::read_u16(r)?;

        let mut attrs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = String::from_utf8_lossy(&codec::read_bytes(r)?).into_owned();
            let value = codec::read_bytes(r)?;
            attrs.push(Xattr { key, value });
        }

        Ok(Self(attrs))
    }
}

impl FromIterator<Xattr> for Xattrs {
    fn from_iter<I: IntoIterator<Item = Xattr>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
