//! RAX file repository - Entry Point
//!
//! Command-line driver for a storage root: list, archive, upload, mkdir, rm.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};
use tokio::fs::File;
use tokio::io::{self, AsyncWriteExt};

use rax_file_repo::utils::logging::init_logging;
use rax_file_repo::{IngestReport, Repository, RepositoryConfig, ServerError, UploadItem};

#[derive(Debug, Parser)]
#[command(name = "rax-file-repo", version, about = "Sandboxed file repository")]
struct Cli {
    /// Configuration file (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the canonical storage root
    Root,
    /// List a directory
    List {
        #[arg(default_value = "")]
        path: String,
    },
    /// Write a zip archive of one or more paths
    Archive {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store local files into a repository directory
    Upload {
        target: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Create a folder
    Mkdir { parent: String, name: String },
    /// Delete a file or directory tree
    Rm { path: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let config = RepositoryConfig::load(cli.config.as_deref())?;
    let repository = Repository::from_config(&config)?;

    match cli.command {
        Command::Root => {
            println!("{}", repository.root().path().display());
        }
        Command::List { path } => {
            for entry in repository.list(&path)? {
                let size = entry
                    .size
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let marker = if entry.is_directory { "/" } else { "" };
                println!(
                    "{:>12} {:>15} {}{}",
                    size,
                    entry.last_modified_millis(),
                    entry.name,
                    marker
                );
            }
        }
        Command::Archive { paths, output } => {
            let name = repository.archive_name(&paths)?;
            let (mut reader, handle) = repository.spawn_archive(&paths)?;
            match output {
                Some(path) => {
                    let mut file = File::create(&path).await?;
                    io::copy(&mut reader, &mut file).await?;
                    file.flush().await?;
                    info!("Wrote {name} to {}", path.display());
                }
                None => {
                    let mut stdout = io::stdout();
                    io::copy(&mut reader, &mut stdout).await?;
                    stdout.flush().await?;
                }
            }
            let summary = handle.await.map_err(std::io::Error::other)??;
            info!(
                "Archived {} entries ({} content bytes, {} bytes written)",
                summary.entries, summary.content_bytes, summary.bytes_written
            );
        }
        Command::Upload { target, files } => {
            let report = tokio::task::spawn_blocking(move || -> Result<IngestReport, ServerError> {
                let mut items = Vec::with_capacity(files.len());
                for path in &files {
                    let file = std::fs::File::open(path)?;
                    let len = file.metadata()?.len();
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    items.push(UploadItem::new(name, file).with_declared_len(len));
                }
                repository.ingest(&target, items).map_err(ServerError::from)
            })
            .await
            .map_err(std::io::Error::other)??;

            for name in &report.stored {
                println!("stored {name}");
            }
            for skipped in &report.skipped {
                println!("skipped {} ({})", skipped.name, skipped.reason);
            }
        }
        Command::Mkdir { parent, name } => {
            let created = repository.create_folder(&parent, &name)?;
            println!("{created}");
        }
        Command::Rm { path } => {
            repository.delete(&path)?;
            info!("Deleted /{}", path.trim_start_matches(['/', '\\']));
        }
    }

    Ok(())
}
