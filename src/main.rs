//! youpod media service
//!
//! Stores converted audio in a user's remote object store and serves it back
//! to podcast clients through a bounded local disk cache.

mod cache;
mod config;
mod drive;
mod media;
mod principal;
mod server;
mod store;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{Cli, Command, Config, Credentials};
use media::{FileMetadata, MediaFile};
use principal::PrincipalDirectory;
use server::MediaServer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { listen, principals } => serve(&cli.config, &listen, &principals).await,
        Command::Upload {
            credentials,
            path,
            name,
            content_type,
            author,
            thumbnail,
        } => {
            let upload = UploadRequest {
                path: &path,
                name,
                content_type,
                author,
                thumbnail: thumbnail.as_deref(),
            };
            upload_file(&cli.config, &credentials, upload).await
        }
        Command::Fetch {
            credentials,
            file_id,
            output,
        } => fetch_file(&cli.config, &credentials, &file_id, &output).await,
    }
}

async fn serve(config: &Config, listen: &str, principals: &Path) -> Result<()> {
    info!(default_store = %config.backend, "Starting youpod media server");

    let principals = Arc::new(PrincipalDirectory::load(principals)?);
    let coordinator = Arc::new(config.build_coordinator(&config.cache_dir()?)?);

    let mut server = MediaServer::new(Arc::clone(&coordinator), principals);
    if let Err(e) = server.start(listen).await {
        error!(error = %e, "Failed to start HTTP server");
        return Err(e);
    }

    info!("Server ready. Press Ctrl+C to stop.");
    server.run(shutdown_signal()).await?;

    info!("Received shutdown signal, clearing disk cache...");
    coordinator.shutdown();

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
}

struct UploadRequest<'a> {
    path: &'a Path,
    name: Option<String>,
    content_type: String,
    author: String,
    thumbnail: Option<&'a Path>,
}

async fn upload_file(config: &Config, credentials: &Credentials, upload: UploadRequest<'_>) -> Result<()> {
    let content = tokio::fs::read(upload.path)
        .await
        .with_context(|| format!("Failed to read {:?}", upload.path))?;

    let name = match upload.name {
        Some(name) => name,
        None => upload
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .context("Cannot derive a name from the path, pass --name")?,
    };

    let mut metadata = FileMetadata::new(name, upload.content_type);
    metadata.author = upload.author;
    if let Some(thumbnail) = upload.thumbnail {
        let picture = tokio::fs::read(thumbnail)
            .await
            .with_context(|| format!("Failed to read thumbnail {:?}", thumbnail))?;
        metadata.thumbnail = base64::engine::general_purpose::STANDARD.encode(picture);
    }

    // Scratch cache so a running server's cache directory is left alone
    let scratch = tempfile::tempdir().context("Failed to create scratch cache directory")?;
    let coordinator = config.build_coordinator(scratch.path())?;

    let principal = credentials.principal(config.backend);
    let file_id = coordinator
        .save_file(&principal, MediaFile::new(metadata, content))
        .await?;

    info!(user = %principal.username, file_id = %file_id, "Upload complete");
    println!("{}", file_id);
    Ok(())
}

async fn fetch_file(config: &Config, credentials: &Credentials, file_id: &str, output: &Path) -> Result<()> {
    let scratch = tempfile::tempdir().context("Failed to create scratch cache directory")?;
    let coordinator = config.build_coordinator(scratch.path())?;
    let principal = credentials.principal(config.backend);

    let mut content = coordinator.get_file_content(&principal, file_id).await?;
    let mut out = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("Failed to create {:?}", output))?;
    let written = tokio::io::copy(&mut content, &mut out)
        .await
        .with_context(|| format!("Failed to write {:?}", output))?;

    coordinator.shutdown();
    info!(file_id = file_id, bytes = written, output = %output.display(), "Fetch complete");
    Ok(())
}
