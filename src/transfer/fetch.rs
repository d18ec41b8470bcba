//! fetch driver: request objects over the descriptor stream, verify and
//! hold received bodies, and commit each object only once everything it
//! references has landed.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::codec::ObjectType;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::object::{ObjectSink, ObjectWriter, TempRef};
use crate::repo::Repository;
use crate::transfer::frame::Frame;
use crate::transfer::progress::{CountingReader, ProgressMeter};
use crate::types::{Application, Descriptor, Directory};

/// capacity of the in-flight request window, mirrored by the server's
/// digest channel
pub const IN_FLIGHT_LIMIT: usize = 256;

/// composite object bodies are buffered for parsing; anything larger than
/// this is treated as a protocol violation rather than trusted blindly
const MAX_COMPOSITE_SIZE: u64 = 256 * 1024 * 1024;

/// a received, digest-verified object held in temp storage until its
/// remaining dependencies commit
struct HeldRef {
    temp: Option<TempRef>,
    missing: usize,
}

type SharedHeldRef = Rc<RefCell<HeldRef>>;

/// reverse index from a missing child digest to the held parents waiting
/// on it. recreated per fetch; it has no persistent form.
#[derive(Default)]
struct DependencySet {
    waiters: HashMap<Digest, Vec<SharedHeldRef>>,
}

impl DependencySet {
    fn add(&mut self, child: &Digest, held: &SharedHeldRef) {
        self.waiters
            .entry(child.clone())
            .or_default()
            .push(Rc::clone(held));
    }

    fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// a child committed: decrement each waiting parent, committing and
    /// cascading any parent whose count reaches zero
    fn child_committed(&mut self, child: &Digest) -> Result<()> {
        let Some(parents) = self.waiters.remove(child) else {
            return Ok(());
        };

        for held in parents {
            let mut h = held.borrow_mut();
            h.missing -= 1;
            if h.missing > 0 {
                continue;
            }

            if let Some(temp) = h.temp.take() {
                let digest = temp.descriptor().digest().clone();
                drop(h);
                temp.commit()?;
                trace!(%digest, "committed held object");
                self.child_committed(&digest)?;
            }
        }

        Ok(())
    }
}

/// drive a fetch of the object graph rooted at `root`.
///
/// WANT and SKIP frames go out on `writer`; object bodies come back on
/// `reader` in request order. on return the local store contains every
/// object reachable from the root, and at every intermediate point the set
/// of committed objects is closed under reference.
pub fn fetch_objects<R: Read, W: Write>(
    repo: &Repository,
    mut reader: R,
    mut writer: W,
    root: &Descriptor,
    progress: &mut ProgressMeter,
) -> Result<()> {
    let mut in_flight: VecDeque<Descriptor> = VecDeque::with_capacity(IN_FLIGHT_LIMIT);
    let mut wait_stack: Vec<Descriptor> = Vec::new();
    let mut requested: HashSet<Digest> = HashSet::new();
    let mut deps = DependencySet::default();

    progress.total_objects += 1 + root.num_sub_objects();
    progress.total_size += root.size() + root.sub_objects_size();

    in_flight.push_back(root.clone());
    requested.insert(root.digest().clone());
    Frame::Want(root.clone()).marshal(&mut writer)?;
    writer.flush()?;

    while let Some(desc) = in_flight.front().cloned() {
        let (temp_ref, children) = receive_object(repo, &mut reader, &desc, progress)?;
        progress.transferred_objects += 1;

        in_flight.pop_front();
        requested.remove(desc.digest());

        let held = Rc::new(RefCell::new(HeldRef {
            temp: Some(temp_ref),
            missing: 0,
        }));

        for child in children {
            let queued = requested.contains(child.digest());
            let have = !queued && repo.contains(child.digest());

            if !have {
                // not committed locally yet: this object must wait for it
                held.borrow_mut().missing += 1;
                deps.add(child.digest(), &held);
            }

            if queued || have {
                Frame::Skip(child.clone()).marshal(&mut writer)?;
                progress.skip(&child);
                continue;
            }

            wait_stack.push(child.clone());
            requested.insert(child.digest().clone());
        }

        let missing = held.borrow().missing;
        if missing == 0 {
            if let Some(temp) = held.borrow_mut().temp.take() {
                temp.commit()?;
            }
            deps.child_committed(desc.digest())?;
        } else {
            trace!(digest = %desc.digest(), missing, "holding object");
        }

        while in_flight.len() < IN_FLIGHT_LIMIT {
            let Some(next) = wait_stack.pop() else {
                break;
            };
            Frame::Want(next.clone()).marshal(&mut writer)?;
            in_flight.push_back(next);
        }
        writer.flush()?;
    }

    Frame::Done.marshal(&mut writer)?;
    writer.flush()?;

    // a merkle dag is acyclic, so every held object must have cascaded
    if !deps.is_empty() {
        return Err(Error::Protocol(
            "held objects with unresolved references after transfer".to_string(),
        ));
    }

    debug!(
        transferred = progress.transferred_objects,
        skipped = progress.skipped_objects,
        "fetch complete"
    );
    Ok(())
}

/// read one object body, verify its digest, and hold it in temp storage.
/// composite bodies are buffered alongside the write so child descriptors
/// can be parsed out after verification.
fn receive_object<R: Read>(
    repo: &Repository,
    reader: &mut R,
    desc: &Descriptor,
    progress: &mut ProgressMeter,
) -> Result<(TempRef, Vec<Descriptor>)> {
    let mut writer = ObjectWriter::new(repo, desc.object_type())?;
    let mut limited = CountingReader::new(reader.by_ref().take(desc.size()));

    let buffered = if desc.object_type().is_composite() {
        if desc.size() > MAX_COMPOSITE_SIZE {
            return Err(Error::Protocol(format!(
                "composite object body of {} bytes exceeds limit",
                desc.size()
            )));
        }

        let mut buf = Vec::with_capacity(desc.size() as usize);
        limited.read_to_end(&mut buf)?;
        writer.write_all(&buf)?;
        Some(buf)
    } else {
        io::copy(&mut limited, &mut writer)?;
        None
    };

    progress.transferred_size += limited.count();
    if limited.count() < desc.size() {
        return Err(Error::Truncated);
    }

    let actual = writer.digest();
    if actual != *desc.digest() {
        writer.cancel();
        return Err(Error::DigestMismatch {
            expected: desc.digest().clone(),
            actual,
        });
    }

    // digest is verified, now it is safe to parse out the children
    let children = match (&buffered, desc.object_type()) {
        (Some(buf), ObjectType::Directory) => {
            Directory::unmarshal(&mut buf.as_slice())?.dependencies()
        }
        (Some(buf), ObjectType::Application) => {
            Application::unmarshal(&mut buf.as_slice())?.dependencies()
        }
        _ => Vec::new(),
    };

    let temp_ref = writer.hold()?;
    Ok((temp_ref, children))
}
