//! integrity verification: re-hash every object reachable from a
//! descriptor and recount the directory rollups against the stored values.

use std::collections::HashSet;
use std::io::Read;

use crate::codec::ObjectType;
use crate::digest::{Digest, Digester};
use crate::error::{Error, Result};
use crate::object::{get_application, get_directory};
use crate::repo::Repository;
use crate::types::Descriptor;

/// verification report for one reachable tree
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub objects_checked: usize,
    /// objects whose stored bytes hash to a different digest
    pub corrupt: Vec<Digest>,
    /// referenced objects missing from the store
    pub missing: Vec<Descriptor>,
    /// directories whose stored rollups disagree with a recount
    pub bad_rollups: Vec<Digest>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.corrupt.is_empty() && self.missing.is_empty() && self.bad_rollups.is_empty()
    }
}

/// verify every object reachable from the given descriptor
pub fn verify(repo: &Repository, desc: &Descriptor) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    let mut visited = HashSet::new();
    verify_object(repo, desc, &mut visited, &mut report)?;
    Ok(report)
}

/// recount of a directory subtree: (num_sub_objects, sub_objects_size)
fn recount(repo: &Repository, digest: &Digest) -> Result<(u32, u64)> {
    let dir = get_directory(repo, digest)?;

    let mut num = dir.len() as u32;
    let mut size = 0u64;

    for entry in dir.entries() {
        size += entry.header_size + entry.object_size;

        if entry.dirent_type.has_object() {
            num += 1;
        }

        if entry.is_dir() {
            if let Some(sub) = &entry.object_digest {
                let (sub_num, sub_size) = recount(repo, sub)?;
                num += sub_num;
                size += sub_size;
            }
        }
    }

    Ok((num, size))
}

fn verify_object(
    repo: &Repository,
    desc: &Descriptor,
    visited: &mut HashSet<Digest>,
    report: &mut VerifyReport,
) -> Result<()> {
    if !visited.insert(desc.digest().clone()) {
        return Ok(());
    }

    if !repo.contains(desc.digest()) {
        report.missing.push(desc.clone());
        return Ok(());
    }

    report.objects_checked += 1;

    if !rehash_matches(repo, desc.digest())? {
        report.corrupt.push(desc.digest().clone());
        return Ok(());
    }

    match desc.object_type() {
        ObjectType::Directory => {
            let dir = get_directory(repo, desc.digest())?;

            // stored rollups must agree with a fresh recount
            let (num, size) = (dir.total_sub_objects(), dir.total_sub_objects_size());
            if num != desc.num_sub_objects() || size != desc.sub_objects_size() {
                report.bad_rollups.push(desc.digest().clone());
            }

            for child in dir.dependencies() {
                verify_object(repo, &child, visited, report)?;
            }
        }
        ObjectType::Application => {
            let app = get_application(repo, desc.digest())?;
            for child in app.dependencies() {
                verify_object(repo, &child, visited, report)?;
            }
        }
        ObjectType::File | ObjectType::Header => {}
    }

    Ok(())
}

/// recompute the digest of a stored object body
fn rehash_matches(repo: &Repository, digest: &Digest) -> Result<bool> {
    let mut file = repo.open_object(digest)?;

    // skip the type tag; the digest covers the body only
    let mut tag = [0u8; 1];
    file.read_exact(&mut tag).map_err(Error::from)?;

    let mut digester = Digester::new(digest.algorithm());
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(Error::from)?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
    }

    Ok(digester.digest() == *digest)
}

/// deep rollup check: recount the subtree below a directory descriptor by
/// walking the stored objects and compare with the descriptor's counters
pub fn check_rollups(repo: &Repository, desc: &Descriptor) -> Result<bool> {
    let (num, size) = recount(repo, desc.digest())?;
    Ok(num == desc.num_sub_objects() && size == desc.sub_objects_size())
}

/// list the digest of every object in the store by walking the sharded
/// objects directory
pub fn list_objects(repo: &Repository) -> Result<Vec<Digest>> {
    let objects = repo.objects_path();
    let mut digests = Vec::new();

    for entry in walkdir::WalkDir::new(&objects).min_depth(4).max_depth(4) {
        let entry = entry.map_err(|e| Error::Io {
            path: objects.clone(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walkdir error")),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry.path().strip_prefix(&objects).unwrap_or(entry.path());
        let mut hex = String::new();
        for component in rel.iter() {
            hex.push_str(&component.to_string_lossy());
        }

        digests.push(Digest::from_hex(&hex)?);
    }

    digests.sort();
    Ok(digests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ingest::store_directory;
    use std::fs;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(&dir.path().join("repo")).unwrap();
        (dir, repo)
    }

    fn test_tree(base: &std::path::Path) -> std::path::PathBuf {
        let source = base.join("source");
        fs::create_dir_all(source.join("a/deep")).unwrap();
        fs::write(source.join("a/x"), "hello").unwrap();
        fs::write(source.join("a/deep/y"), "nested").unwrap();
        fs::write(source.join("b"), "hello").unwrap();
        source
    }

    #[test]
    fn test_verify_healthy_tree() {
        let (dir, repo) = test_repo();
        let desc = store_directory(&repo, &test_tree(dir.path())).unwrap();

        let report = verify(&repo, &desc).unwrap();
        assert!(report.is_ok(), "{report:?}");
        assert!(report.objects_checked > 0);
    }

    #[test]
    fn test_rollups_match_recount() {
        let (dir, repo) = test_repo();
        let desc = store_directory(&repo, &test_tree(dir.path())).unwrap();

        assert!(check_rollups(&repo, &desc).unwrap());
    }

    #[test]
    fn test_list_objects_finds_everything_once() {
        let (dir, repo) = test_repo();
        store_directory(&repo, &test_tree(dir.path())).unwrap();
        // identical content stored twice dedups, so listing has no repeats
        store_directory(&repo, &test_tree(dir.path())).unwrap();

        let listed = list_objects(&repo).unwrap();
        let unique: std::collections::HashSet<_> = listed.iter().cloned().collect();
        assert_eq!(listed.len(), unique.len());
        assert!(!listed.is_empty());

        for digest in &listed {
            assert!(repo.contains(digest));
        }
    }

    #[test]
    fn test_verify_detects_corruption() {
        let (dir, repo) = test_repo();
        let desc = store_directory(&repo, &test_tree(dir.path())).unwrap();

        // flip a byte in one stored file object body
        let root = get_directory(&repo, desc.digest()).unwrap();
        let victim = root.get("b").unwrap().object_digest.clone().unwrap();
        let path = repo.object_path(&victim);
        let mut f = fs::OpenOptions::new().write(true).open(path).unwrap();
        f.seek(SeekFrom::Start(1)).unwrap();
        f.write_all(b"X").unwrap();
        drop(f);

        let report = verify(&repo, &desc).unwrap();
        assert!(!report.is_ok());
        assert!(report.corrupt.contains(&victim));
    }

    #[test]
    fn test_verify_detects_missing() {
        let (dir, repo) = test_repo();
        let desc = store_directory(&repo, &test_tree(dir.path())).unwrap();

        let root = get_directory(&repo, desc.digest()).unwrap();
        let victim = root.get("b").unwrap().object_digest.clone().unwrap();
        fs::remove_file(repo.object_path(&victim)).unwrap();

        let report = verify(&repo, &desc).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.missing.len(), 1);
        assert_eq!(*report.missing[0].digest(), victim);
    }
}
