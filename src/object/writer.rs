use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::codec::ObjectType;
use crate::digest::{Digest, Digester};
use crate::error::{IoResultExt, Result};
use crate::repo::Repository;
use crate::types::Descriptor;

/// common surface of object sinks: stream bytes, observe the running digest
/// and body size. the repository-backed [`ObjectWriter`] is the normal
/// implementation; [`MemoryWriter`] computes descriptors without touching a
/// store.
pub trait ObjectSink: Write {
    /// digest of the body bytes written so far
    fn digest(&self) -> Digest;
    /// body bytes written so far (the type tag is not counted)
    fn bytes_written(&self) -> u64;
    fn object_type(&self) -> ObjectType;
}

/// sink that streams an object body into a temporary file while feeding the
/// digester. the one-byte type tag goes to the file only: descriptor size
/// and digest both describe the body alone.
///
/// finish with exactly one of `commit`, `hold`, or `cancel`; dropping an
/// unfinished writer removes the temporary file.
pub struct ObjectWriter<'r> {
    repo: &'r Repository,
    out: BufWriter<File>,
    temp_path: PathBuf,
    digester: Digester,
    object_type: ObjectType,
    bytes_written: u64,
    finished: bool,
}

impl<'r> ObjectWriter<'r> {
    pub fn new(repo: &'r Repository, object_type: ObjectType) -> Result<Self> {
        let (file, temp_path) = repo.temp_file()?;
        let mut out = BufWriter::new(file);

        out.write_all(&[object_type.tag()]).with_path(&temp_path)?;

        Ok(Self {
            repo,
            out,
            temp_path,
            digester: Digester::new(repo.config().digest_algorithm),
            object_type,
            bytes_written: 0,
            finished: false,
        })
    }

    /// close the temp file and name its destination without renaming it into
    /// place. used by the fetch path to defer the commit until every
    /// referenced object has landed.
    pub fn hold(mut self) -> Result<TempRef> {
        let result = self.finish();
        if result.is_err() {
            self.remove_temp();
        }
        self.finished = true;
        result?;

        let digest = self.digester.digest();
        let descriptor = Descriptor::new(digest.clone(), self.bytes_written, self.object_type);
        let destination = self.repo.object_path(&digest);

        Ok(TempRef {
            descriptor,
            temp_path: std::mem::take(&mut self.temp_path),
            destination,
            committed: false,
        })
    }

    /// flush, digest, and move the object into its content address
    pub fn commit(self) -> Result<Descriptor> {
        self.hold()?.commit()
    }

    /// abandon the write and delete the temporary file
    pub fn cancel(mut self) {
        self.remove_temp();
        self.finished = true;
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().with_path(&self.temp_path)?;
        self.out.get_ref().sync_all().with_path(&self.temp_path)?;
        Ok(())
    }

    fn remove_temp(&self) {
        let _ = fs::remove_file(&self.temp_path);
    }
}

impl Write for ObjectWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.out.write(buf)?;
        self.digester.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl ObjectSink for ObjectWriter<'_> {
    fn digest(&self) -> Digest {
        self.digester.digest()
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn object_type(&self) -> ObjectType {
        self.object_type
    }
}

impl Drop for ObjectWriter<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.remove_temp();
        }
    }
}

/// a fully written, digest-named object that has not been renamed into
/// place. committing is the linearization point: until then nothing is
/// observable at the destination path, and dropping an uncommitted ref
/// deletes the temporary file.
pub struct TempRef {
    descriptor: Descriptor,
    temp_path: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl TempRef {
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// move the object into its content address. if an object already
    /// exists there the temp file is simply discarded: content addressing
    /// makes the existing bytes equivalent.
    pub fn commit(mut self) -> Result<Descriptor> {
        self.committed = true;

        if self.destination.exists() {
            fs::remove_file(&self.temp_path).with_path(&self.temp_path)?;
            return Ok(self.descriptor.clone());
        }

        if let Some(parent) = self.destination.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        if let Err(e) = fs::rename(&self.temp_path, &self.destination) {
            let _ = fs::remove_file(&self.temp_path);
            return Err(crate::Error::Io {
                path: self.destination.clone(),
                source: e,
            });
        }

        Ok(self.descriptor.clone())
    }

    /// abandon the held object and delete its temporary file
    pub fn cancel(mut self) {
        self.committed = true;
        let _ = fs::remove_file(&self.temp_path);
    }
}

impl Drop for TempRef {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// in-memory sink: computes digests and descriptors without a repository
pub struct MemoryWriter {
    buf: Vec<u8>,
    digester: Digester,
    object_type: ObjectType,
}

impl MemoryWriter {
    pub fn new(alg: crate::digest::DigestAlgorithm, object_type: ObjectType) -> Self {
        Self {
            buf: Vec::new(),
            digester: Digester::new(alg),
            object_type,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn descriptor(&self) -> Descriptor {
        Descriptor::new(self.digest(), self.buf.len() as u64, self.object_type)
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.digester.update(buf);
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectSink for MemoryWriter {
    fn digest(&self) -> Digest {
        self.digester.digest()
    }

    fn bytes_written(&self) -> u64 {
        self.buf.len() as u64
    }

    fn object_type(&self) -> ObjectType {
        self.object_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{digest_of, DEFAULT_ALGORITHM};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(&dir.path().join("repo")).unwrap();
        (dir, repo)
    }

    fn read_object_file(repo: &Repository, digest: &Digest) -> Vec<u8> {
        fs::read(repo.object_path(digest)).unwrap()
    }

    #[test]
    fn test_commit_writes_tagged_file() {
        let (_dir, repo) = test_repo();

        let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
        w.write_all(b"hello").unwrap();
        let desc = w.commit().unwrap();

        assert_eq!(desc.size(), 5);
        assert_eq!(desc.object_type(), ObjectType::File);
        assert_eq!(*desc.digest(), digest_of(DEFAULT_ALGORITHM, b"hello"));

        // on disk: type tag byte then the body; digest covers the body only
        let raw = read_object_file(&repo, desc.digest());
        assert_eq!(raw, b"\x00hello");
    }

    #[test]
    fn test_commit_deduplicates() {
        let (_dir, repo) = test_repo();

        let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
        w.write_all(b"same").unwrap();
        let d1 = w.commit().unwrap();

        let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
        w.write_all(b"same").unwrap();
        let d2 = w.commit().unwrap();

        assert_eq!(d1, d2);
        // second commit must have cleaned up its temp file
        assert_eq!(fs::read_dir(repo.temp_path()).unwrap().count(), 0);
    }

    #[test]
    fn test_hold_defers_rename() {
        let (_dir, repo) = test_repo();

        let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
        w.write_all(b"held").unwrap();
        let temp_ref = w.hold().unwrap();

        let digest = temp_ref.descriptor().digest().clone();
        assert!(!repo.contains(&digest));

        temp_ref.commit().unwrap();
        assert!(repo.contains(&digest));
    }

    #[test]
    fn test_cancel_removes_temp() {
        let (_dir, repo) = test_repo();

        let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
        w.write_all(b"gone").unwrap();
        w.cancel();

        assert_eq!(fs::read_dir(repo.temp_path()).unwrap().count(), 0);
        assert!(!repo.contains(&digest_of(DEFAULT_ALGORITHM, b"gone")));
    }

    #[test]
    fn test_dropped_writer_cleans_temp() {
        let (_dir, repo) = test_repo();

        {
            let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
            w.write_all(b"leak?").unwrap();
        }

        assert_eq!(fs::read_dir(repo.temp_path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dropped_temp_ref_cleans_temp() {
        let (_dir, repo) = test_repo();

        let digest;
        {
            let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
            w.write_all(b"abandoned").unwrap();
            let temp_ref = w.hold().unwrap();
            digest = temp_ref.descriptor().digest().clone();
        }

        assert_eq!(fs::read_dir(repo.temp_path()).unwrap().count(), 0);
        assert!(!repo.contains(&digest));
    }

    #[test]
    fn test_running_digest() {
        let (_dir, repo) = test_repo();

        let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
        w.write_all(b"ab").unwrap();
        assert_eq!(w.digest(), digest_of(DEFAULT_ALGORITHM, b"ab"));
        w.write_all(b"cd").unwrap();
        assert_eq!(w.digest(), digest_of(DEFAULT_ALGORITHM, b"abcd"));
        w.cancel();
    }

    #[test]
    fn test_memory_writer_matches_file_writer() {
        let (_dir, repo) = test_repo();

        let mut m = MemoryWriter::new(DEFAULT_ALGORITHM, ObjectType::File);
        m.write_all(b"content").unwrap();

        let mut w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
        w.write_all(b"content").unwrap();
        let desc = w.commit().unwrap();

        assert_eq!(m.descriptor(), desc);
    }

    #[test]
    fn test_empty_object() {
        let (_dir, repo) = test_repo();

        let w = ObjectWriter::new(&repo, ObjectType::File).unwrap();
        let desc = w.commit().unwrap();

        assert_eq!(desc.size(), 0);
        let raw = read_object_file(&repo, desc.digest());
        assert_eq!(raw, b"\x00");
    }
}
