use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{IoResultExt, Result};
use crate::fs::{HostMetadata, MetadataProvider};
use crate::object::{new_directory_writer, put_application, put_header, store_file};
use crate::repo::Repository;
use crate::tags::set_tag;
use crate::types::{Application, Descriptor, DirentType, DirectoryEntry};

/// recursively store the directory at the given host path, returning the
/// descriptor of the root directory object.
///
/// callers should hold a shared repository lock: object writes under a
/// shared lock are safe because identical content lands at identical paths.
pub fn store_directory(repo: &Repository, path: &Path) -> Result<Descriptor> {
    store_directory_with(repo, &HostMetadata, path)
}

/// store a directory using a caller-supplied metadata provider
pub fn store_directory_with<M: MetadataProvider>(
    repo: &Repository,
    provider: &M,
    path: &Path,
) -> Result<Descriptor> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path).with_path(path)? {
        let entry = entry.with_path(path)?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }

    let mut writer = new_directory_writer(repo, names.len());

    for name in names {
        let entry_path = path.join(&name);

        let header = provider.header(&entry_path)?;
        let header_desc = put_header(repo, &header)?;

        let dirent_type = header.mode.dirent_type();
        let mut entry = DirectoryEntry {
            name,
            dirent_type,
            link_target: String::new(),
            header_digest: header_desc.digest().clone(),
            header_size: header_desc.size(),
            object_digest: None,
            object_size: 0,
            num_sub_objects: 0,
            sub_objects_size: 0,
        };

        match dirent_type {
            DirentType::Directory => {
                let desc = store_directory_with(repo, provider, &entry_path)?;
                entry.object_digest = Some(desc.digest().clone());
                entry.object_size = desc.size();
                entry.num_sub_objects = desc.num_sub_objects();
                entry.sub_objects_size = desc.sub_objects_size();
            }
            DirentType::Regular => {
                let desc = store_file(repo, &entry_path)?;
                entry.object_digest = Some(desc.digest().clone());
                entry.object_size = desc.size();
            }
            DirentType::Link => {
                entry.link_target = provider.read_link(&entry_path)?;
            }
            // devices, fifos, and sockets carry only their header
            _ => {}
        }

        writer.add(entry);
    }

    let desc = writer.commit()?;
    debug!(path = %path.display(), digest = %desc.digest(), "stored directory");
    Ok(desc)
}

/// store a directory tree as an application: the rootfs directory plus the
/// root's own header, pinned by an application object
pub fn store_application(repo: &Repository, path: &Path) -> Result<Descriptor> {
    store_application_with(repo, &HostMetadata, path)
}

pub fn store_application_with<M: MetadataProvider>(
    repo: &Repository,
    provider: &M,
    path: &Path,
) -> Result<Descriptor> {
    let directory_desc = store_directory_with(repo, provider, path)?;

    let header = provider.header(path)?;
    let header_desc = put_header(repo, &header)?;

    let app = Application::new(header_desc, directory_desc);
    put_application(repo, &app)
}

/// store a directory tree as an application and tag the result
pub fn store_and_tag(repo: &Repository, path: &Path, tag: &str) -> Result<Descriptor> {
    let desc = store_application(repo, path)?;
    set_tag(repo, tag, &desc)?;
    Ok(desc)
}
