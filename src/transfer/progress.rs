use std::io::{self, Read, Write};

use crate::types::Descriptor;

/// transfer accounting shared by both sides of the protocol. rendering is a
/// caller concern; the core only maintains the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressMeter {
    pub transferred_objects: u32,
    pub skipped_objects: u32,
    pub total_objects: u32,
    pub transferred_size: u64,
    pub skipped_size: u64,
    pub total_size: u64,
}

impl ProgressMeter {
    /// account a skipped descriptor: the rollups collapse the whole subtree
    /// the peer need not retransmit
    pub fn skip(&mut self, desc: &Descriptor) {
        self.skipped_objects += 1 + desc.num_sub_objects();
        self.skipped_size += desc.size() + desc.sub_objects_size();
    }

    /// fold counters produced by another task into this meter
    pub fn merge(&mut self, other: &ProgressMeter) {
        self.transferred_objects += other.transferred_objects;
        self.skipped_objects += other.skipped_objects;
        self.total_objects += other.total_objects;
        self.transferred_size += other.transferred_size;
        self.skipped_size += other.skipped_size;
        self.total_size += other.total_size;
    }
}

/// reader that counts the bytes it passes through
pub struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// writer that counts the bytes it passes through
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
