use std::fs::File;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::config::Config;
use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};

/// a content-addressable repository of filesystem objects and application
/// container metadata.
///
/// layout under the root:
///
/// ```text
/// objects/<xx>/<xx>/<xx>/<rest>
/// temp/
/// refs/tags/<name>
/// refs/mounts/<digest>
/// config.toml
/// ```
///
/// locking discipline: take a shared lock for read-only work and for object
/// ingestion (content addressing makes concurrent writes of the same object
/// idempotent), an exclusive lock for anything that mutates refs.
pub struct Repository {
    root: PathBuf,
    config: Config,
}

impl Repository {
    /// initialize a new repository at the given path
    pub fn init(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if config_path.exists() {
            return Err(Error::RepoExists(path.to_path_buf()));
        }

        std::fs::create_dir_all(path.join("objects")).with_path(path)?;
        std::fs::create_dir_all(path.join("temp")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs/tags")).with_path(path)?;
        std::fs::create_dir_all(path.join("refs/mounts")).with_path(path)?;

        let config = Config::default();
        config.save(&config_path)?;

        Ok(Self {
            root: path.to_path_buf(),
            config,
        })
    }

    /// open an existing repository
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if !config_path.exists() {
            return Err(Error::NoRepo(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            root: path.to_path_buf(),
            config,
        })
    }

    /// repository root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.root.join("config.toml"))
    }

    pub fn objects_path(&self) -> PathBuf {
        self.root.join("objects")
    }

    pub fn temp_path(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn tags_path(&self) -> PathBuf {
        self.root.join("refs/tags")
    }

    pub fn mounts_path(&self) -> PathBuf {
        self.root.join("refs/mounts")
    }

    /// sharded object path: objects/<h0..2>/<h2..4>/<h4..6>/<h6..>
    pub fn object_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.objects_path()
            .join(&hex[..2])
            .join(&hex[2..4])
            .join(&hex[4..6])
            .join(&hex[6..])
    }

    /// whether an object with the given digest exists in this repository.
    /// a pure filesystem existence check on the sharded path.
    pub fn contains(&self, digest: &Digest) -> bool {
        self.object_path(digest).exists()
    }

    /// open the raw object file (type tag byte first) for the given digest
    pub fn open_object(&self, digest: &Digest) -> Result<File> {
        let path = self.object_path(digest);
        File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ObjectNotFound(digest.clone())
            } else {
                Error::Io { path, source: e }
            }
        })
    }

    /// create a uniquely named file under temp/
    pub fn temp_file(&self) -> Result<(File, PathBuf)> {
        let temp_dir = self.temp_path();
        std::fs::create_dir_all(&temp_dir).with_path(&temp_dir)?;

        let path = temp_dir.join(uuid::Uuid::new_v4().to_string());
        let file = File::create(&path).with_path(&path)?;
        Ok((file, path))
    }

    /// acquire a shared (read/ingest) lock on the repository root directory
    pub fn lock_shared(&self) -> Result<RepoLock> {
        self.lock(FlockArg::LockSharedNonblock)
    }

    /// acquire an exclusive (ref mutation) lock on the repository root
    /// directory
    pub fn lock_exclusive(&self) -> Result<RepoLock> {
        self.lock(FlockArg::LockExclusiveNonblock)
    }

    fn lock(&self, arg: FlockArg) -> Result<RepoLock> {
        let dir = File::open(&self.root).with_path(&self.root)?;
        let flock = Flock::lock(dir, arg).map_err(|_| Error::LockContention)?;
        Ok(RepoLock { _flock: flock })
    }
}

/// guard holding the advisory repository lock until dropped
pub struct RepoLock {
    _flock: Flock<File>,
}
