//! arbor CLI - content-addressed rootfs store

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use arbor::ops::{store_and_tag, store_application, verify};
use arbor::remote::{serve_connection, RemoteSession};
use arbor::tags::{get_tag, list_tags, remove_tag, resolve_ref, set_tag};
use arbor::transfer::ProgressMeter;
use arbor::{object, DirentType, Repository};

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "content-addressed object store for container root filesystems")]
#[command(version)]
struct Cli {
    /// repository path
    #[arg(short, long, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new repository
    Init {
        /// path to create repository at
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// store a directory tree as an application
    Store {
        /// source directory to store
        source: PathBuf,

        /// tag to assign to the stored application
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// list tags
    Tags,

    /// point a tag at an existing application
    Tag {
        /// tag name
        name: String,

        /// reference to an application (tag or hex digest)
        reference: String,
    },

    /// remove a tag
    Untag {
        /// tag name
        name: String,
    },

    /// resolve a reference to its digest
    Resolve {
        /// tag or hex digest
        reference: String,
    },

    /// print the tree behind a reference
    Show {
        /// tag or hex digest
        reference: String,
    },

    /// verify objects reachable from a reference
    Verify {
        /// tag or hex digest
        reference: String,
    },

    /// serve repository services on stdin/stdout
    Serve,

    /// fetch a tag from a remote
    Fetch {
        /// configured remote name
        remote: String,

        /// tag to fetch
        tag: String,
    },

    /// push a tag to a remote
    Push {
        /// configured remote name
        remote: String,

        /// tag to push
        tag: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> arbor::Result<()> {
    if let Commands::Init { path } = &cli.command {
        Repository::init(path)?;
        println!("initialized repository at {}", path.display());
        return Ok(());
    }

    let repo = Repository::open(&cli.repo)?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Store { source, tag } => {
            // tagging mutates refs, a plain store only writes objects
            let desc = match tag {
                Some(tag) => {
                    let _lock = repo.lock_exclusive()?;
                    store_and_tag(&repo, &source, &tag)?
                }
                None => {
                    let _lock = repo.lock_shared()?;
                    store_application(&repo, &source)?
                }
            };
            println!("{}", desc.digest());
        }

        Commands::Tags => {
            for name in list_tags(&repo)? {
                let desc = get_tag(&repo, &name)?;
                println!("{}\t{}", name, desc.digest());
            }
        }

        Commands::Tag { name, reference } => {
            let _lock = repo.lock_exclusive()?;
            let digest = resolve_ref(&repo, &reference)?;
            let app = object::get_application(&repo, &digest)?;
            let desc = object::put_application(&repo, &app)?;
            set_tag(&repo, &name, &desc)?;
        }

        Commands::Untag { name } => {
            let _lock = repo.lock_exclusive()?;
            remove_tag(&repo, &name)?;
        }

        Commands::Resolve { reference } => {
            println!("{}", resolve_ref(&repo, &reference)?);
        }

        Commands::Show { reference } => {
            let _lock = repo.lock_shared()?;
            let digest = resolve_ref(&repo, &reference)?;
            let app = object::get_application(&repo, &digest)?;
            print_directory(&repo, &app.rootfs.directory.digest, "/")?;
        }

        Commands::Verify { reference } => {
            let _lock = repo.lock_shared()?;
            let digest = resolve_ref(&repo, &reference)?;
            let app = object::get_application(&repo, &digest)?;
            let desc = object::put_application(&repo, &app)?;

            let report = verify(&repo, &desc)?;
            println!(
                "checked {} objects: {} corrupt, {} missing, {} bad rollups",
                report.objects_checked,
                report.corrupt.len(),
                report.missing.len(),
                report.bad_rollups.len()
            );
            if !report.is_ok() {
                return Err(arbor::Error::Protocol("verification failed".to_string()));
            }
        }

        Commands::Serve => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout().lock();
            serve_connection(&repo, stdin, stdout)?;
        }

        Commands::Fetch { remote, tag } => {
            let command = remote_command(&repo, &remote)?;

            let mut session = RemoteSession::spawn(&command)?;
            let root = session
                .get_tag(&tag)?
                .ok_or_else(|| arbor::Error::NoSuchTag(tag.clone()))?;

            let mut progress = ProgressMeter::default();
            {
                let _lock = repo.lock_shared()?;
                session.fetch(&repo, &root, &mut progress)?;
            }

            let _lock = repo.lock_exclusive()?;
            set_tag(&repo, &tag, &root)?;
            print_transfer(&progress);
        }

        Commands::Push { remote, tag } => {
            let command = remote_command(&repo, &remote)?;
            let root = {
                let _lock = repo.lock_shared()?;
                get_tag(&repo, &tag)?
            };

            let session = RemoteSession::spawn(&command)?;
            let mut progress = ProgressMeter::default();
            session.push(&repo, &tag, &root, &mut progress)?;
            print_transfer(&progress);
        }
    }

    Ok(())
}

fn remote_command(repo: &Repository, name: &str) -> arbor::Result<Vec<String>> {
    repo.config()
        .get_remote(name)
        .map(|r| r.command.clone())
        .ok_or_else(|| arbor::Error::Transport(format!("remote not configured: {name}")))
}

fn print_transfer(progress: &ProgressMeter) {
    println!(
        "transferred {} objects ({} bytes), skipped {} ({} bytes)",
        progress.transferred_objects,
        progress.transferred_size,
        progress.skipped_objects,
        progress.skipped_size
    );
}

fn print_directory(repo: &Repository, digest: &arbor::Digest, prefix: &str) -> arbor::Result<()> {
    let dir = object::get_directory(repo, digest)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for entry in dir.entries() {
        let header = object::get_header(repo, &entry.header_digest)?;
        let suffix = match entry.dirent_type {
            DirentType::Link => format!(" -> {}", entry.link_target),
            DirentType::Directory => "/".to_string(),
            _ => String::new(),
        };
        writeln!(
            out,
            "{} {:>5}:{:<5} {:>9} {}{}{}",
            header.mode, header.uid, header.gid, entry.object_size, prefix, entry.name, suffix
        )
        .map_err(arbor::Error::from)?;
    }

    for entry in dir.entries() {
        if entry.dirent_type == DirentType::Directory {
            if let Some(sub) = &entry.object_digest {
                print_directory(repo, sub, &format!("{prefix}{}/", entry.name))?;
            }
        }
    }

    Ok(())
}
