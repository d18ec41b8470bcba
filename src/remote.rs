//! remote sessions over a spawned command's stdio.
//!
//! the transport is any ordered bidirectional byte pipe; here it is the
//! stdin/stdout of a helper command such as
//! `ssh host arbor serve --repo /srv/store`. a one-line ASCII preamble
//! selects the service, then the binary protocol takes over.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::debug;

use crate::codec;
use crate::error::{Error, Result};
use crate::repo::Repository;
use crate::tags::{all_tag_descriptors, get_tag, marshal_tag_descriptors, set_tag, unmarshal_tag_descriptors};
use crate::transfer::{fetch_objects, push_objects, receive_objects, serve_objects, ProgressMeter};
use crate::types::Descriptor;

const TAG_FOUND: u8 = 0;
const TAG_MISSING: u8 = 1;

/// client side of a remote session
pub struct RemoteSession<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: W,
    child: Option<Child>,
}

impl RemoteSession<ChildStdout, ChildStdin> {
    /// spawn the remote helper command and attach to its stdio
    pub fn spawn(command: &[String]) -> Result<Self> {
        let Some(program) = command.first() else {
            return Err(Error::Transport("empty remote command".to_string()));
        };

        let mut child = Command::new(program)
            .args(&command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Transport(format!("unable to spawn {program}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("remote stdout not available".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("remote stdin not available".to_string()))?;

        let mut session = Self::new(stdout, stdin);
        session.child = Some(child);
        Ok(session)
    }
}

impl<R: Read + Send + 'static, W: Write> RemoteSession<R, W> {
    /// attach to an already connected pipe
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            child: None,
        }
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// look up a tag's descriptor on the remote
    pub fn get_tag(&mut self, name: &str) -> Result<Option<Descriptor>> {
        self.send_line(&format!("get-tag {name}"))?;

        match codec::read_u8(&mut self.reader)? {
            TAG_FOUND => Ok(Some(Descriptor::unmarshal(&mut self.reader)?)),
            TAG_MISSING => Ok(None),
            other => Err(Error::Protocol(format!("unknown tag status: {other}"))),
        }
    }

    /// list the remote's tags with their descriptors
    pub fn list_tags(&mut self) -> Result<BTreeMap<String, Descriptor>> {
        self.send_line("list-tags")?;
        unmarshal_tag_descriptors(&mut self.reader)
    }

    /// fetch the object graph rooted at `root` from the remote
    pub fn fetch(
        mut self,
        repo: &Repository,
        root: &Descriptor,
        progress: &mut ProgressMeter,
    ) -> Result<()> {
        self.send_line("serve-objects")?;
        fetch_objects(repo, &mut self.reader, &mut self.writer, root, progress)?;
        self.close()
    }

    /// push the object graph rooted at `root`, asking the remote to bind it
    /// to `tag` once complete
    pub fn push(
        mut self,
        repo: &Repository,
        tag: &str,
        root: &Descriptor,
        progress: &mut ProgressMeter,
    ) -> Result<()> {
        self.send_line(&format!("receive-objects {tag}"))?;
        push_objects(repo, self.reader, &mut self.writer, root, progress)?;

        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        Ok(())
    }

    /// end the session and reap the helper process
    pub fn close(mut self) -> Result<()> {
        drop(self.writer);
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        Ok(())
    }
}

/// serve one connection worth of services on the given pipe. lookups may
/// repeat; a streaming service consumes the rest of the connection.
pub fn serve_connection<R, W>(repo: &Repository, reader: R, mut writer: W) -> Result<()>
where
    R: Read + Send + 'static,
    W: Write,
{
    let mut reader = BufReader::new(reader);

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).map_err(Error::from)? == 0 {
            return Ok(());
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a),
            None => (line, ""),
        };
        debug!(command, arg, "remote service request");

        match command {
            "get-tag" => match get_tag(repo, arg) {
                Ok(desc) => {
                    writer.write_all(&[TAG_FOUND])?;
                    desc.marshal(&mut writer)?;
                    writer.flush()?;
                }
                Err(Error::NoSuchTag(_)) => {
                    writer.write_all(&[TAG_MISSING])?;
                    writer.flush()?;
                }
                Err(e) => return Err(e),
            },

            "list-tags" => {
                let tags = all_tag_descriptors(repo)?;
                marshal_tag_descriptors(&mut writer, &tags)?;
                writer.flush()?;
            }

            "serve-objects" => {
                let mut progress = ProgressMeter::default();
                return serve_objects(repo, reader, writer, &mut progress);
            }

            "receive-objects" => {
                let mut progress = ProgressMeter::default();
                let desc = receive_objects(repo, &mut reader, &mut writer, &mut progress)?;
                let _lock = repo.lock_exclusive()?;
                set_tag(repo, arg, &desc)?;
                return Ok(());
            }

            other => {
                return Err(Error::Protocol(format!("unknown service: {other}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{store_and_tag, verify};
    use std::fs;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use tempfile::tempdir;

    fn serve_in_thread<'scope, 'env>(
        s: &'scope thread::Scope<'scope, 'env>,
        repo: &'env Repository,
        sock: UnixStream,
    ) -> thread::ScopedJoinHandle<'scope, Result<()>> {
        s.spawn(move || {
            let reader = sock.try_clone().unwrap();
            let result = serve_connection(repo, reader, &sock);
            drop(sock);
            result
        })
    }

    fn fixture(dir: &std::path::Path) -> (Repository, Descriptor) {
        let repo = Repository::init(&dir.join("src")).unwrap();
        let source = dir.join("source");
        fs::create_dir_all(source.join("bin")).unwrap();
        fs::write(source.join("bin/sh"), "shell").unwrap();
        fs::write(source.join("release"), "1.0").unwrap();
        let desc = store_and_tag(&repo, &source, "v1").unwrap();
        (repo, desc)
    }

    #[test]
    fn test_get_tag_service() {
        let dir = tempdir().unwrap();
        let (src, desc) = fixture(dir.path());

        let (server_sock, client_sock) = UnixStream::pair().unwrap();
        thread::scope(|s| {
            let server = serve_in_thread(s, &src, server_sock);

            let reader = client_sock.try_clone().unwrap();
            let mut session = RemoteSession::new(reader, &client_sock);

            assert_eq!(session.get_tag("v1").unwrap(), Some(desc.clone()));
            assert_eq!(session.get_tag("nope").unwrap(), None);

            session.close().unwrap();
            drop(client_sock);
            server.join().unwrap().unwrap();
        });
    }

    #[test]
    fn test_list_tags_service() {
        let dir = tempdir().unwrap();
        let (src, desc) = fixture(dir.path());
        set_tag(&src, "extra", &desc).unwrap();

        let (server_sock, client_sock) = UnixStream::pair().unwrap();
        thread::scope(|s| {
            let server = serve_in_thread(s, &src, server_sock);

            let reader = client_sock.try_clone().unwrap();
            let mut session = RemoteSession::new(reader, &client_sock);

            let tags = session.list_tags().unwrap();
            assert_eq!(tags.len(), 2);
            assert_eq!(tags["v1"], desc);
            assert_eq!(tags["extra"], desc);

            session.close().unwrap();
            drop(client_sock);
            server.join().unwrap().unwrap();
        });
    }

    #[test]
    fn test_fetch_session_end_to_end() {
        let dir = tempdir().unwrap();
        let (src, desc) = fixture(dir.path());
        let dst = Repository::init(&dir.path().join("dst")).unwrap();

        let (server_sock, client_sock) = UnixStream::pair().unwrap();
        thread::scope(|s| {
            let server = serve_in_thread(s, &src, server_sock);

            let reader = client_sock.try_clone().unwrap();
            let mut session = RemoteSession::new(reader, &client_sock);

            // the usual flow: resolve the tag remotely, then fetch
            let root = session.get_tag("v1").unwrap().unwrap();
            assert_eq!(root, desc);

            let mut progress = ProgressMeter::default();
            session.fetch(&dst, &root, &mut progress).unwrap();
            drop(client_sock);
            server.join().unwrap().unwrap();
        });

        assert!(dst.contains(desc.digest()));
        assert!(verify(&dst, &desc).unwrap().is_ok());
    }

    #[test]
    fn test_push_session_sets_remote_tag() {
        let dir = tempdir().unwrap();
        let (src, desc) = fixture(dir.path());
        let dst = Repository::init(&dir.path().join("dst")).unwrap();

        let (server_sock, client_sock) = UnixStream::pair().unwrap();
        thread::scope(|s| {
            let server = serve_in_thread(s, &dst, server_sock);

            let reader = client_sock.try_clone().unwrap();
            let session = RemoteSession::new(reader, &client_sock);

            let mut progress = ProgressMeter::default();
            session.push(&src, "pushed", &desc, &mut progress).unwrap();
            drop(client_sock);
            server.join().unwrap().unwrap();
        });

        assert_eq!(get_tag(&dst, "pushed").unwrap(), desc);
        assert!(verify(&dst, &desc).unwrap().is_ok());
    }

    #[test]
    fn test_unknown_service_rejected() {
        let dir = tempdir().unwrap();
        let (src, _desc) = fixture(dir.path());

        let (server_sock, client_sock) = UnixStream::pair().unwrap();
        thread::scope(|s| {
            let server = serve_in_thread(s, &src, server_sock);

            (&client_sock).write_all(b"launch-missiles now\n").unwrap();
            drop(client_sock);

            let result = server.join().unwrap();
            assert!(matches!(result, Err(Error::Protocol(_))));
        });
    }
}
