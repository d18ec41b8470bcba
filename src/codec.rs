//! little-endian wire primitives shared by every object codec.
//!
//! multi-byte integers are fixed-width little-endian. variable byte strings
//! are framed with a u16 length, which caps names, xattr keys, and xattr
//! values at 65535 bytes.

use std::fmt;
use std::io::{Read, Write};

use crate::error::{Error, Result};

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn read_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// write a u16-length-prefixed byte string
pub fn write_bytes<W: Write>(w: &mut W, buf: &[u8], what: &'static str) -> Result<()> {
    let len = u16::try_from(buf.len()).map_err(|_| Error::Oversize {
        what,
        len: buf.len(),
    })?;
    write_u16(w, len)?;
    w.write_all(buf)?;
    Ok(())
}

/// read a u16-length-prefixed byte string
pub fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// type tag prepended to every object file on disk.
///
/// the tag byte disambiguates object files on read but is not part of the
/// object body: it is excluded from both the descriptor size and the digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectType {
    File = 0,
    Directory = 1,
    Header = 2,
    Application = 3,
}

impl ObjectType {
    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => ObjectType::File,
            1 => ObjectType::Directory,
            2 => ObjectType::Header,
            3 => ObjectType::Application,
            other => return Err(Error::Protocol(format!("unknown object type tag: {other}"))),
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// whether objects of this type reference other objects
    pub fn is_composite(self) -> bool {
        matches!(self, ObjectType::Directory | ObjectType::Application)
    }

    pub fn marshal<W: Write>(self, w: &mut W) -> Result<()> {
        w.write_all(&[self.tag()])?;
        Ok(())
    }

    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        Self::from_tag(read_u8(r)?)
    }

    /// unmarshal a type tag and require it to match
    pub fn expect<R: Read>(r: &mut R, expected: ObjectType) -> Result<()> {
        let actual = Self::unmarshal(r)?;
        if actual != expected {
            return Err(Error::WrongType { expected, actual });
        }
        Ok(())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectType::File => "file",
            ObjectType::Directory => "directory",
            ObjectType::Header => "header",
            ObjectType::Application => "application",
        })
    }
}
