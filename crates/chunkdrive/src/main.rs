//! chunkdrive - chunked file storage service and CLI
//!
//! Subcommands:
//! - `chunkdrive serve` - Run the HTTP file service
//! - `chunkdrive put <path>` - Store a local file
//! - `chunkdrive update <id> <path>` - Upload a new version of a stored file
//! - `chunkdrive get <id>` - Write a stored file to stdout or `-o <path>`
//! - `chunkdrive ls` / `show` / `rename` / `rm`

use std::path::PathBuf;

use anyhow::{Context, Result};
use chunkstore::{StorageConfig, VersionedFileStore};
use clap::{Parser, Subcommand};

use chunkdrive::http::{DiskStore, DEFAULT_BODY_LIMIT};
use chunkdrive::{commands, logging, serve};

#[derive(Parser)]
#[command(name = "chunkdrive")]
#[command(about = "Chunked, versioned file storage")]
#[command(version)]
struct Cli {
    /// TOML config file with a [storage] section
    #[arg(short, long, env = "CHUNKDRIVE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Storage directory (overrides config and CHUNKDRIVE_STORAGE_PATH)
    #[arg(short, long, global = true)]
    storage: Option<PathBuf>,

    /// Chunk size in bytes (overrides config)
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Debug logging for chunkdrive and the storage engine
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP file service
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0", env = "CHUNKDRIVE_HOST")]
        host: String,

        /// HTTP port to bind
        #[arg(short, long, default_value = "8080", env = "CHUNKDRIVE_PORT")]
        port: u16,

        /// Maximum request body size in bytes
        #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
        body_limit: usize,
    },

    /// Store a local file as a new file
    Put {
        path: PathBuf,

        /// Stored name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,

        /// MIME type
        #[arg(short = 't', long)]
        content_type: Option<String>,
    },

    /// Upload a new version of a stored file
    Update {
        /// File ID
        id: String,
        path: PathBuf,
    },

    /// Write a stored file's content
    Get {
        /// File ID
        id: String,

        /// Output path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored files
    Ls,

    /// Print a file's manifest
    Show {
        /// File ID
        id: String,
    },

    /// Change a file's name and optionally its MIME type
    Rename {
        /// File ID
        id: String,
        name: String,

        #[arg(short = 't', long)]
        content_type: Option<String>,
    },

    /// Delete a file (its chunks are kept)
    Rm {
        /// File ID
        id: String,
    },
}

fn storage_config(cli: &Cli) -> Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::from_file(path)?,
        None => StorageConfig::from_env()?,
    };
    if let Some(path) = &cli.storage {
        config.base_path = path.clone();
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &StorageConfig) -> Result<DiskStore> {
    VersionedFileStore::open(config)
        .with_context(|| format!("failed to open storage at {}", config.base_path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = storage_config(&cli)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            body_limit,
        } => {
            serve::run(serve::ServeConfig {
                host,
                port,
                body_limit,
                storage: config,
            })
            .await?;
        }
        Commands::Put {
            path,
            name,
            content_type,
        } => {
            let store = open_store(&config)?;
            commands::put(&store, &path, name.as_deref(), content_type.as_deref())?;
        }
        Commands::Update { id, path } => {
            commands::update(&open_store(&config)?, &id, &path)?;
        }
        Commands::Get { id, output } => {
            commands::get(&open_store(&config)?, &id, output.as_deref())?;
        }
        Commands::Ls => {
            commands::list(&open_store(&config)?)?;
        }
        Commands::Show { id } => commands::show(&open_store(&config)?, &id)?,
        Commands::Rename {
            id,
            name,
            content_type,
        } => commands::rename(&open_store(&config)?, &id, &name, content_type.as_deref())?,
        Commands::Rm { id } => commands::remove(&open_store(&config)?, &id)?,
    }

    Ok(())
}
