//! server side of the transfer protocol: one task decodes the inbound
//! descriptor stream, one streams object bodies back out, joined by a
//! bounded digest channel that provides the backpressure window.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread;

use tracing::{debug, trace};

use crate::codec::ObjectType;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::repo::Repository;
use crate::transfer::fetch::{fetch_objects, IN_FLIGHT_LIMIT};
use crate::transfer::frame::Frame;
use crate::transfer::progress::ProgressMeter;
use crate::types::Descriptor;

/// serve objects to a fetching peer until it signals DONE.
///
/// the request reader runs on its own thread; bodies are written from the
/// calling thread in request order. if body writing fails the reader thread
/// is left parked on its read and unblocks when the caller closes the
/// transport.
pub fn serve_objects<R, W>(
    repo: &Repository,
    reader: R,
    mut writer: W,
    progress: &mut ProgressMeter,
) -> Result<()>
where
    R: Read + Send + 'static,
    W: Write,
{
    let (digest_tx, digest_rx) = mpsc::sync_channel::<Digest>(IN_FLIGHT_LIMIT);
    let (done_tx, done_rx) = mpsc::channel::<Result<ProgressMeter>>();

    thread::spawn(move || {
        let result = read_requests(reader, digest_tx);
        let _ = done_tx.send(result);
    });

    let sent = send_objects(repo, &mut writer, digest_rx)?;

    // the reader dropped its channel end before reporting, so this does not
    // block once the send loop has drained
    let read = match done_rx.recv() {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::Protocol(
                "request reader terminated without reporting".to_string(),
            ))
        }
    };

    progress.merge(&sent);
    progress.merge(&read);

    debug!(
        transferred = progress.transferred_objects,
        skipped = progress.skipped_objects,
        "serve complete"
    );
    Ok(())
}

/// decode the descriptor stream: queue WANTs, account SKIPs, stop on DONE.
/// a WANT that would overflow the channel means the remote is not pacing
/// itself against the in-flight window.
fn read_requests<R: Read>(mut reader: R, digests: SyncSender<Digest>) -> Result<ProgressMeter> {
    let mut meter = ProgressMeter::default();

    loop {
        match Frame::unmarshal(&mut reader)? {
            Frame::Done => return Ok(meter),
            Frame::Skip(desc) => {
                trace!(digest = %desc.digest(), "peer skipped object");
                meter.skip(&desc);
            }
            Frame::Want(desc) => {
                if let Err(e) = digests.try_send(desc.digest().clone()) {
                    return Err(match e {
                        TrySendError::Full(_) => Error::Backpressure,
                        TrySendError::Disconnected(_) => {
                            Error::Protocol("object sender terminated".to_string())
                        }
                    });
                }
            }
        }
    }
}

/// stream requested object bodies, stripping the leading type tag
fn send_objects<W: Write>(
    repo: &Repository,
    writer: &mut W,
    digests: Receiver<Digest>,
) -> Result<ProgressMeter> {
    let mut meter = ProgressMeter::default();

    while let Ok(digest) = digests.recv() {
        let mut object = repo.open_object(&digest)?;

        // the remote writes its own type tag; only the body travels
        ObjectType::unmarshal(&mut object)?;

        let n = io::copy(&mut object, writer).map_err(Error::from)?;
        writer.flush()?;

        meter.transferred_size += n;
        meter.transferred_objects += 1;
        trace!(%digest, bytes = n, "sent object");
    }

    Ok(meter)
}

/// push the object graph rooted at `root` to a receiving peer: announce the
/// root descriptor, then serve the peer's requests
pub fn push_objects<R, W>(
    repo: &Repository,
    reader: R,
    mut writer: W,
    root: &Descriptor,
    progress: &mut ProgressMeter,
) -> Result<()>
where
    R: Read + Send + 'static,
    W: Write,
{
    root.marshal(&mut writer)?;
    writer.flush()?;

    serve_objects(repo, reader, writer, progress)
}

/// receive a pushed object graph: read the announced root, skip everything
/// if it is already present, otherwise drive the fetch algorithm over the
/// same pipe. the caller decides what to tag with the returned descriptor.
pub fn receive_objects<R: Read, W: Write>(
    repo: &Repository,
    mut reader: R,
    mut writer: W,
    progress: &mut ProgressMeter,
) -> Result<Descriptor> {
    let root = Descriptor::unmarshal(&mut reader)?;

    if repo.contains(root.digest()) {
        Frame::Skip(root.clone()).marshal(&mut writer)?;
        Frame::Done.marshal(&mut writer)?;
        writer.flush()?;
        progress.skip(&root);
        return Ok(root);
    }

    fetch_objects(repo, reader, writer, &root, progress)?;
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::get_directory;
    use crate::ops::{store_and_tag, store_directory, verify};
    use crate::tags::{get_tag, set_tag};
    use std::fs;
    use std::io::{Seek, SeekFrom};
    use std::os::unix::net::UnixStream;
    use tempfile::tempdir;

    fn test_repo(dir: &std::path::Path, name: &str) -> Repository {
        Repository::init(&dir.join(name)).unwrap()
    }

    fn sample_tree(base: &std::path::Path) -> std::path::PathBuf {
        let source = base.join("source");
        fs::create_dir_all(source.join("a")).unwrap();
        fs::write(source.join("a/x"), "hello").unwrap();
        fs::write(source.join("b"), "hello").unwrap();
        fs::write(source.join("big"), vec![7u8; 100 * 1024]).unwrap();
        std::os::unix::fs::symlink("a/x", source.join("ln")).unwrap();
        source
    }

    /// run a fetch over a socketpair against a serving repository
    fn fetch_over_pipe(
        src: &Repository,
        dst: &Repository,
        root: &Descriptor,
    ) -> (Result<()>, Result<()>, ProgressMeter) {
        let (server_sock, client_sock) = UnixStream::pair().unwrap();

        let mut client_progress = ProgressMeter::default();
        let (server_result, client_result) = thread::scope(|s| {
            let server = s.spawn(|| {
                let reader = server_sock.try_clone().unwrap();
                let mut progress = ProgressMeter::default();
                let result = serve_objects(src, reader, &server_sock, &mut progress);
                drop(server_sock);
                result
            });

            let reader = client_sock.try_clone().unwrap();
            let client_result =
                fetch_objects(dst, reader, &client_sock, root, &mut client_progress);
            drop(client_sock);

            (server.join().unwrap(), client_result)
        });

        (server_result, client_result, client_progress)
    }

    #[test]
    fn test_fetch_transfers_whole_tree() {
        let dir = tempdir().unwrap();
        let src = test_repo(dir.path(), "src");
        let dst = test_repo(dir.path(), "dst");

        let source = sample_tree(dir.path());
        let root = store_and_tag(&src, &source, "v1").unwrap();

        let (server_result, client_result, progress) = fetch_over_pipe(&src, &dst, &root);
        server_result.unwrap();
        client_result.unwrap();

        assert!(dst.contains(root.digest()));
        assert!(progress.transferred_objects > 0);

        // destination tree verifies clean: closed under reference and
        // byte-identical content
        let report = verify(&dst, &root).unwrap();
        assert!(report.is_ok(), "{report:?}");
    }

    #[test]
    fn test_fetch_skips_present_objects() {
        let dir = tempdir().unwrap();
        let src = test_repo(dir.path(), "src");
        let dst = test_repo(dir.path(), "dst");

        let source = sample_tree(dir.path());
        let root = store_and_tag(&src, &source, "v1").unwrap();

        // pre-seed the destination with just the shared file object
        let app = crate::object::get_application(&src, root.digest()).unwrap();
        let src_root_dir = get_directory(&src, &app.rootfs.directory.digest).unwrap();
        let file_digest = src_root_dir.get("b").unwrap().object_digest.clone().unwrap();
        let mut w = crate::object::new_file_writer(&dst).unwrap();
        io::copy(
            &mut crate::object::get_file(&src, &file_digest).unwrap(),
            &mut w,
        )
        .unwrap();
        w.commit().unwrap();

        let (server_result, client_result, progress) = fetch_over_pipe(&src, &dst, &root);
        server_result.unwrap();
        client_result.unwrap();

        assert!(progress.skipped_objects >= 1);
        let report = verify(&dst, &root).unwrap();
        assert!(report.is_ok(), "{report:?}");
    }

    #[test]
    fn test_fetch_duplicate_children_requested_once() {
        let dir = tempdir().unwrap();
        let src = test_repo(dir.path(), "src");
        let dst = test_repo(dir.path(), "dst");

        // two files with identical content and identical metadata: the same
        // file object and header appear under two parents
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("one"), "same bytes").unwrap();
        fs::write(source.join("two"), "same bytes").unwrap();

        let root = store_directory(&src, &source).unwrap();
        let (server_result, client_result, progress) = fetch_over_pipe(&src, &dst, &root);
        server_result.unwrap();
        client_result.unwrap();

        // second occurrences resolve as skips, not duplicate bodies
        assert!(progress.skipped_objects >= 2);
        assert!(verify(&dst, &root).unwrap().is_ok());
    }

    #[test]
    fn test_fetch_corrupt_body_aborts_without_dangling_commits() {
        let dir = tempdir().unwrap();
        let src = test_repo(dir.path(), "src");
        let dst = test_repo(dir.path(), "dst");

        let source = sample_tree(dir.path());
        let root = store_and_tag(&src, &source, "v1").unwrap();

        // flip one byte inside a stored file object body on the server
        let app = crate::object::get_application(&src, root.digest()).unwrap();
        let src_root_dir = get_directory(&src, &app.rootfs.directory.digest).unwrap();
        let victim = src_root_dir.get("b").unwrap().object_digest.clone().unwrap();
        let path = src.object_path(&victim);
        let mut f = fs::OpenOptions::new().write(true).open(path).unwrap();
        f.seek(SeekFrom::Start(1)).unwrap();
        f.write_all(b"X").unwrap();
        drop(f);

        let (_server_result, client_result, _progress) = fetch_over_pipe(&src, &dst, &root);
        assert!(matches!(
            client_result,
            Err(Error::DigestMismatch { .. })
        ));

        // the corrupted object never landed, nor did anything that
        // references it
        assert!(!dst.contains(&victim));
        assert!(!dst.contains(root.digest()));
        assert!(!dst.contains(&app.rootfs.directory.digest));

        // whatever did commit before the failure still verifies
        for entry in walkdir::WalkDir::new(dst.objects_path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let raw = fs::read(entry.path()).unwrap();
            let alg = crate::digest::DigestAlgorithm::from_tag(0x05).unwrap();
            let digest = crate::digest::digest_of(alg, &raw[1..]);
            assert!(entry.path().ends_with(
                std::path::Path::new(&digest.to_hex()[..2])
                    .join(&digest.to_hex()[2..4])
                    .join(&digest.to_hex()[4..6])
                    .join(&digest.to_hex()[6..])
            ));
        }
    }

    #[test]
    fn test_push_to_empty_peer() {
        let dir = tempdir().unwrap();
        let src = test_repo(dir.path(), "src");
        let dst = test_repo(dir.path(), "dst");

        let source = sample_tree(dir.path());
        let root = store_and_tag(&src, &source, "v1").unwrap();

        let (pusher_sock, receiver_sock) = UnixStream::pair().unwrap();

        let (push_result, recv_result) = thread::scope(|s| {
            let pusher = s.spawn(|| {
                let reader = pusher_sock.try_clone().unwrap();
                let mut progress = ProgressMeter::default();
                let result = push_objects(&src, reader, &pusher_sock, &root, &mut progress);
                drop(pusher_sock);
                result
            });

            let reader = receiver_sock.try_clone().unwrap();
            let mut progress = ProgressMeter::default();
            let recv_result =
                receive_objects(&dst, reader, &receiver_sock, &mut progress).map(|desc| {
                    set_tag(&dst, "v1", &desc).unwrap();
                    desc
                });
            drop(receiver_sock);

            (pusher.join().unwrap(), recv_result)
        });

        push_result.unwrap();
        let received = recv_result.unwrap();
        assert_eq!(received, root);

        assert_eq!(get_tag(&dst, "v1").unwrap(), root);
        assert!(verify(&dst, &root).unwrap().is_ok());
    }

    #[test]
    fn test_push_already_present_transfers_nothing() {
        let dir = tempdir().unwrap();
        let src = test_repo(dir.path(), "src");
        let dst = test_repo(dir.path(), "dst");

        let source = sample_tree(dir.path());
        let root = store_and_tag(&src, &source, "v1").unwrap();

        // destination already has everything
        let (a, b) = UnixStream::pair().unwrap();
        thread::scope(|s| {
            let pusher = s.spawn(|| {
                let reader = a.try_clone().unwrap();
                let mut progress = ProgressMeter::default();
                let result = push_objects(&src, reader, &a, &root, &mut progress);
                drop(a);
                (result, progress)
            });
            let reader = b.try_clone().unwrap();
            let mut progress = ProgressMeter::default();
            receive_objects(&dst, reader, &b, &mut progress).unwrap();
            drop(b);
            pusher.join().unwrap().0.unwrap();
        });

        // second push: peer answers with a single skip and transfers no
        // bodies
        let (a, b) = UnixStream::pair().unwrap();
        let (push_progress, recv_desc) = thread::scope(|s| {
            let pusher = s.spawn(|| {
                let reader = a.try_clone().unwrap();
                let mut progress = ProgressMeter::default();
                push_objects(&src, reader, &a, &root, &mut progress).unwrap();
                drop(a);
                progress
            });
            let reader = b.try_clone().unwrap();
            let mut progress = ProgressMeter::default();
            let desc = receive_objects(&dst, reader, &b, &mut progress).unwrap();
            drop(b);
            (pusher.join().unwrap(), desc)
        });

        assert_eq!(recv_desc, root);
        assert_eq!(push_progress.transferred_objects, 0);
        assert_eq!(push_progress.transferred_size, 0);
        assert!(push_progress.skipped_objects >= 1);

        set_tag(&dst, "again", &recv_desc).unwrap();
        assert_eq!(get_tag(&dst, "again").unwrap(), root);
    }

    #[test]
    fn test_read_requests_backpressure() {
        let mut stream = Vec::new();
        let desc = Descriptor::new(
            crate::digest::digest_of(crate::digest::DEFAULT_ALGORITHM, b"x"),
            1,
            ObjectType::File,
        );
        for _ in 0..3 {
            Frame::Want(desc.clone()).marshal(&mut stream).unwrap();
        }
        Frame::Done.marshal(&mut stream).unwrap();

        // window of two, nothing draining
        let (tx, _rx) = mpsc::sync_channel::<Digest>(2);
        let result = read_requests(stream.as_slice(), tx);
        assert!(matches!(result, Err(Error::Backpressure)));
    }

    #[test]
    fn test_read_requests_accounts_skips() {
        let desc = Descriptor::new(
            crate::digest::digest_of(crate::digest::DEFAULT_ALGORITHM, b"dir"),
            100,
            ObjectType::Directory,
        )
        .with_sub_objects(4, 900);

        let mut stream = Vec::new();
        Frame::Skip(desc).marshal(&mut stream).unwrap();
        Frame::Done.marshal(&mut stream).unwrap();

        let (tx, _rx) = mpsc::sync_channel::<Digest>(1);
        let meter = read_requests(stream.as_slice(), tx).unwrap();
        assert_eq!(meter.skipped_objects, 5);
        assert_eq!(meter.skipped_size, 1000);
    }
}
