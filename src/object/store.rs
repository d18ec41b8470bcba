use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};

use crate::codec::ObjectType;
use crate::digest::Digest;
use crate::error::Result;
use crate::object::writer::ObjectWriter;
use crate::repo::Repository;
use crate::types::{Application, Descriptor, Directory, DirectoryEntry, Header};

/// get the header object with the given digest
pub fn get_header(repo: &Repository, digest: &Digest) -> Result<Header> {
    let mut r = open_typed(repo, digest, ObjectType::Header)?;
    Header::unmarshal(&mut r)
}

/// put a header object, returning its descriptor
pub fn put_header(repo: &Repository, header: &Header) -> Result<Descriptor> {
    let mut w = ObjectWriter::new(repo, ObjectType::Header)?;
    if let Err(e) = header.marshal(&mut w) {
        w.cancel();
        return Err(e);
    }
    w.commit()
}

/// get the directory object with the given digest
pub fn get_directory(repo: &Repository, digest: &Digest) -> Result<Directory> {
    let mut r = open_typed(repo, digest, ObjectType::Directory)?;
    Directory::unmarshal(&mut r)
}

/// get the application object with the given digest
pub fn get_application(repo: &Repository, digest: &Digest) -> Result<Application> {
    let mut r = open_typed(repo, digest, ObjectType::Application)?;
    Application::unmarshal(&mut r)
}

/// put an application object. the returned descriptor's rollups cover the
/// rootfs header, the rootfs directory, and the directory's subtree.
pub fn put_application(repo: &Repository, app: &Application) -> Result<Descriptor> {
    let mut w = ObjectWriter::new(repo, ObjectType::Application)?;
    if let Err(e) = app.marshal(&mut w) {
        w.cancel();
        return Err(e);
    }
    let desc = w.commit()?;

    Ok(
        Descriptor::new(desc.digest().clone(), desc.size(), desc.object_type())
            .with_sub_objects(app.total_sub_objects(), app.total_sub_objects_size()),
    )
}

/// begin writing a new file object
pub fn new_file_writer(repo: &Repository) -> Result<ObjectWriter<'_>> {
    ObjectWriter::new(repo, ObjectType::File)
}

/// open the file object with the given digest as a seekable reader whose
/// position 0 is the first body byte
pub fn get_file(repo: &Repository, digest: &Digest) -> Result<ObjectFile> {
    let mut file = repo.open_object(digest)?;
    crate::codec::ObjectType::expect(&mut file, ObjectType::File)?;
    Ok(ObjectFile { file })
}

fn open_typed(
    repo: &Repository,
    digest: &Digest,
    expected: ObjectType,
) -> Result<BufReader<File>> {
    let mut r = BufReader::new(repo.open_object(digest)?);
    ObjectType::expect(&mut r, expected)?;
    Ok(r)
}

/// seekable reader over a file object body. seeks are offset by one so the
/// leading type tag is never visible to the caller.
pub struct ObjectFile {
    file: File,
}

impl Read for ObjectFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for ObjectFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let inner = match pos {
            SeekFrom::Start(offset) => self.file.seek(SeekFrom::Start(offset + 1))?,
            other => {
                let n = self.file.seek(other)?;
                if n < 1 {
                    // ran past the type tag, clamp to the first body byte
                    self.file.seek(SeekFrom::Start(1))?
                } else {
                    n
                }
            }
        };
        Ok(inner - 1)
    }
}

/// accumulates directory entries, sorts them into canonical order on
/// commit, and produces a descriptor carrying the rollup counters
pub struct DirectoryWriter<'r> {
    repo: &'r Repository,
    entries: Vec<DirectoryEntry>,
}

impl<'r> DirectoryWriter<'r> {
    pub fn add(&mut self, entry: DirectoryEntry) {
        self.entries.push(entry);
    }

    pub fn commit(self) -> Result<Descriptor> {
        let directory = Directory::new(self.entries)?;

        let mut w = ObjectWriter::new(self.repo, ObjectType::Directory)?;
        if let Err(e) = directory.marshal(&mut w) {
            w.cancel();
            return Err(e);
        }
        let desc = w.commit()?;

        Ok(
            Descriptor::new(desc.digest().clone(), desc.size(), desc.object_type())
                .with_sub_objects(
                    directory.total_sub_objects(),
                    directory.total_sub_objects_size(),
                ),
        )
    }
}

/// begin writing a new directory object
pub fn new_directory_writer(repo: &Repository, estimated_len: usize) -> DirectoryWriter<'_> {
    DirectoryWriter {
        repo,
        entries: Vec::with_capacity(estimated_len),
    }
}

/// store the regular file at the given host path as a file object
pub fn store_file(repo: &Repository, path: &std::path::Path) -> Result<Descriptor> {
    use crate::error::IoResultExt;

    let mut file = File::open(path).with_path(path)?;
    let mut w = new_file_writer(repo)?;

    if let Err(e) = io::copy(&mut file, &mut w).with_path(path) {
        w.cancel();
        return Err(e);
    }

    w.commit()
}
