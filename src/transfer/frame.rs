//! descriptor stream framing.
//!
//! the fetcher-to-server direction is a sequence of one-byte headers, each
//! WANT and SKIP followed by a marshaled descriptor. DONE carries no
//! descriptor and nothing may follow it.

use std::io::{Read, Write};

use crate::codec;
use crate::error::{Error, Result};
use crate::types::Descriptor;

pub const FRAME_DONE: u8 = 0;
pub const FRAME_WANT: u8 = 1;
pub const FRAME_SKIP: u8 = 2;

/// one item of the descriptor stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// no more requests follow
    Done,
    /// send me this object's body
    Want(Descriptor),
    /// i already have (or have queued) this object
    Skip(Descriptor),
}

impl Frame {
    pub fn marshal<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            Frame::Done => w.write_all(&[FRAME_DONE])?,
            Frame::Want(desc) => {
                w.write_all(&[FRAME_WANT])?;
                desc.marshal(w)?;
            }
            Frame::Skip(desc) => {
                w.write_all(&[FRAME_SKIP])?;
                desc.marshal(w)?;
            }
        }
        Ok(())
    }

    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        match codec::read_u8(r)? {
            FRAME_DONE => Ok(Frame::Done),
            FRAME_WANT => Ok(Frame::Want(Descriptor::unmarshal(r)?)),
            FRAME_SKIP => Ok(Frame::Skip(Descriptor::unmarshal(r)?)),
            other => Err(Error::Protocol(format!(
                "unknown descriptor stream header: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ObjectType;
    use crate::digest::{digest_of, DEFAULT_ALGORITHM};

    fn desc() -> Descriptor {
        Descriptor::new(digest_of(DEFAULT_ALGORITHM, b"obj"), 42, ObjectType::File)
    }

    #[test]
    fn test_frame_roundtrip() {
        for frame in [Frame::Done, Frame::Want(desc()), Frame::Skip(desc())] {
            let mut buf = Vec::new();
            frame.marshal(&mut buf).unwrap();
            assert_eq!(Frame::unmarshal(&mut buf.as_slice()).unwrap(), frame);
        }
    }

    #[test]
    fn test_done_is_single_byte() {
        let mut buf = Vec::new();
        Frame::Done.marshal(&mut buf).unwrap();
        assert_eq!(buf, [FRAME_DONE]);
    }

    #[test]
    fn test_unknown_header_rejected() {
        let mut r: &[u8] = &[9];
        assert!(matches!(
            Frame::unmarshal(&mut r),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_frames_stream_back_to_back() {
        let mut buf = Vec::new();
        Frame::Want(desc()).marshal(&mut buf).unwrap();
        Frame::Skip(desc()).marshal(&mut buf).unwrap();
        Frame::Done.marshal(&mut buf).unwrap();

        let mut r = buf.as_slice();
        assert!(matches!(Frame::unmarshal(&mut r).unwrap(), Frame::Want(_)));
        assert!(matches!(Frame::unmarshal(&mut r).unwrap(), Frame::Skip(_)));
        assert!(matches!(Frame::unmarshal(&mut r).unwrap(), Frame::Done));
        assert!(r.is_empty());
    }
}
