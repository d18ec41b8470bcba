use std::fmt;
use std::io::{Read, Write};

use nix::libc;

use crate::codec;
use crate::error::Result;
use crate::types::Xattrs;

/// portable file mode: permission bits plus file-type flags packed into a
/// single u32 that encodes the same way on every host.
///
/// bit layout, fixed for the life of the format:
///   bits 0..12   permission bits including setuid/setgid/sticky (0o7777)
///   bit 31       directory
///   bit 30       symlink
///   bit 29       device
///   bit 28       char device (set together with bit 29)
///   bit 27       fifo
///   bit 26       socket
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mode(u32);

pub const MODE_PERM_MASK: u32 = 0o7777;
pub const MODE_DIRECTORY: u32 = 1 << 31;
pub const MODE_SYMLINK: u32 = 1 << 30;
pub const MODE_DEVICE: u32 = 1 << 29;
pub const MODE_CHAR_DEVICE: u32 = 1 << 28;
pub const MODE_FIFO: u32 = 1 << 27;
pub const MODE_SOCKET: u32 = 1 << 26;

const MODE_TYPE_MASK: u32 =
    MODE_DIRECTORY | MODE_SYMLINK | MODE_DEVICE | MODE_CHAR_DEVICE | MODE_FIFO | MODE_SOCKET;

impl Mode {
    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// convert a host `st_mode` into the portable layout
    pub fn from_host(st_mode: u32) -> Self {
        let mut bits = st_mode & MODE_PERM_MASK;

        match st_mode & libc::S_IFMT {
            libc::S_IFDIR => bits |= MODE_DIRECTORY,
            libc::S_IFLNK => bits |= MODE_SYMLINK,
            libc::S_IFBLK => bits |= MODE_DEVICE,
            libc::S_IFCHR => bits |= MODE_DEVICE | MODE_CHAR_DEVICE,
            libc::S_IFIFO => bits |= MODE_FIFO,
            libc::S_IFSOCK => bits |= MODE_SOCKET,
            _ => {} // regular, or unknown host type left as regular
        }

        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// permission bits including setuid/setgid/sticky
    pub fn perm(self) -> u32 {
        self.0 & MODE_PERM_MASK
    }

    pub fn is_dir(self) -> bool {
        self.0 & MODE_DIRECTORY != 0
    }

    pub fn is_symlink(self) -> bool {
        self.0 & MODE_SYMLINK != 0
    }

    pub fn is_regular(self) -> bool {
        self.0 & MODE_TYPE_MASK == 0
    }

    /// directory entry type corresponding to this mode
    pub fn dirent_type(self) -> DirentType {
        if self.0 & MODE_DIRECTORY != 0 {
            DirentType::Directory
        } else if self.0 & MODE_SYMLINK != 0 {
            DirentType::Link
        } else if self.0 & MODE_CHAR_DEVICE != 0 {
            DirentType::CharDevice
        } else if self.0 & MODE_DEVICE != 0 {
            DirentType::BlockDevice
        } else if self.0 & MODE_FIFO != 0 {
            DirentType::Fifo
        } else if self.0 & MODE_SOCKET != 0 {
            DirentType::Socket
        } else {
            DirentType::Regular
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = match self.dirent_type() {
            DirentType::Directory => 'd',
            DirentType::Link => 'l',
            DirentType::BlockDevice => 'b',
            DirentType::CharDevice => 'c',
            DirentType::Fifo => 'p',
            DirentType::Socket => 's',
            DirentType::Regular | DirentType::Unknown => '-',
        };
        write!(f, "{}{:04o}", t, self.perm())
    }
}

/// type of an entry in a directory listing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DirentType {
    Unknown = 0,
    BlockDevice = 1,
    CharDevice = 2,
    Directory = 3,
    Fifo = 4,
    Link = 5,
    Regular = 6,
    Socket = 7,
}

impl DirentType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => DirentType::BlockDevice,
            2 => DirentType::CharDevice,
            3 => DirentType::Directory,
            4 => DirentType::Fifo,
            5 => DirentType::Link,
            6 => DirentType::Regular,
            7 => DirentType::Socket,
            _ => DirentType::Unknown,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// whether entries of this type carry a content object
    pub fn has_object(self) -> bool {
        matches!(self, DirentType::Regular | DirentType::Directory)
    }
}

impl fmt::Display for DirentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DirentType::Unknown => "unknown",
            DirentType::BlockDevice => "block device",
            DirentType::CharDevice => "char device",
            DirentType::Directory => "directory",
            DirentType::Fifo => "fifo",
            DirentType::Link => "symlink",
            DirentType::Regular => "regular",
            DirentType::Socket => "socket",
        })
    }
}

/// filesystem metadata record for one or more directory entries.
///
/// size and timestamps are deliberately absent: every file that shares
/// (mode, rdev, uid, gid, xattrs) shares one header object, and the entry
/// size lives in the directory entry instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub mode: Mode,
    pub rdev: u32,
    pub uid: u32,
    pub gid: u32,
    pub xattrs: Xattrs,
}

impl Header {
    /// marshal as `u32 mode · u32 rdev · u32 uid · u32 gid · xattrs`
    pub fn marshal<W: Write>(&self, w: &mut W) -> Result<()> {
        codec::write_u32(w, self.mode.bits())?;
        codec::write_u32(w, self.rdev)?;
        codec::write_u32(w, self.uid)?;
        codec::write_u32(w, self.gid)?;
        self.xattrs.marshal(w)
    }

    pub fn unmarshal<R: Read>(r: &mut R) -> Result<Self> {
        let mode = Mode::new(codec::read_u32(r)?);
        let rdev = codec::read_u32(r)?;
        let uid = codec::read_u32(r)?;
        let gid = codec::read_u32(r)?;
        let xattrs = Xattrs::unmarshal(r)?;

        Ok(Self {
            mode,
            rdev,
            uid,
            gid,
            xattrs,
        })
    }
}
