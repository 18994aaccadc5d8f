use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use knowledge_ingest::extraction::{UploadedFile, format};
use knowledge_ingest::{api, config::Config, ingestion::IngestionOrchestrator, logging};
use tokio::net::TcpListener;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "knowledge-ingest",
    about = "Extract, embed and index documents into OpenSearch"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Ingest files, walking directories, through the bulk path.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Extract, chunk and embed one file without indexing; prints JSON.
    Embed { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    logging::init_tracing(&config.log_file);

    let orchestrator = IngestionOrchestrator::from_config(&config)
        .context("failed to initialize ingestion pipeline")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, orchestrator).await,
        Command::Ingest { paths, workers } => {
            let files = collect_files(&paths)?;
            if files.is_empty() {
                bail!("no supported files found under the given paths");
            }
            let report = orchestrator
                .ingest_files(files, workers)
                .await
                .context("ingestion failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Embed { file } => {
            let upload = read_upload(&file)?;
            let outcome = orchestrator
                .process_single(&upload)
                .await
                .with_context(|| format!("failed to process {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

async fn serve(config: &Config, orchestrator: IngestionOrchestrator) -> Result<()> {
    let app = api::create_router(Arc::new(orchestrator));
    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .await
        .context("HTTP server terminated unexpectedly")
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if format::detect(&name).is_none() {
                tracing::debug!(path = %entry.path().display(), "Skipping unsupported file");
                continue;
            }
            files.push(read_upload(entry.path())?);
        }
    }
    Ok(files)
}

fn read_upload(path: &Path) -> Result<UploadedFile> {
    let content =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(filename, content))
}

async fn bind_listener(preferred: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = preferred {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
