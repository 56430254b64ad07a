//! Command line and environment configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::cache::{DiskCache, MetadataCache};
use crate::drive::client::{DRIVE_API_URL, DRIVE_UPLOAD_URL};
use crate::drive::{DriveConfig, DriveStore};
use crate::media::{FsMetadataRepository, MediaCoordinator, StoreRegistry};
use crate::principal::Principal;
use crate::store::{InMemoryStore, RemoteStore, RetryPolicy, RetryingStore, StoreType};

/// Upper bound on cached metadata records
const METADATA_CACHE_ENTRIES: u64 = 1000;

#[derive(Debug, Parser)]
#[command(name = "youpod-media", version, about = "Remote audio store and streaming cache")]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve cached content over HTTP with byte-range support
    Serve {
        /// Listen address
        #[arg(long, env = "YOUPOD_LISTEN", default_value = "127.0.0.1:8080")]
        listen: String,

        /// JSON file mapping usernames to access tokens
        #[arg(long, env = "YOUPOD_PRINCIPALS")]
        principals: PathBuf,
    },
    /// Upload an audio file and record its metadata
    Upload {
        #[command(flatten)]
        credentials: Credentials,

        /// Audio file to upload
        path: PathBuf,

        /// Display name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "audio/mpeg")]
        content_type: String,

        #[arg(long, default_value = "")]
        author: String,

        /// JPEG thumbnail stored with the metadata
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },
    /// Download a stored file through the cache
    Fetch {
        #[command(flatten)]
        credentials: Credentials,

        file_id: String,

        /// Where to write the content
        #[arg(long, short)]
        output: PathBuf,
    },
}

/// Owning user for CLI operations
#[derive(Debug, Clone, Args)]
pub struct Credentials {
    #[arg(long, env = "YOUPOD_USER")]
    pub user: String,

    /// OAuth2 access token for the backend
    #[arg(long, env = "YOUPOD_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,
}

impl Credentials {
    /// Principal whose uploads go to `default_store`
    pub fn principal(&self, default_store: StoreType) -> Principal {
        Principal::new(self.user.clone(), self.access_token.clone()).with_default_store(default_store)
    }
}

/// Settings shared by every command
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Store CLI uploads go to
    #[arg(long, env = "YOUPOD_BACKEND", value_enum, default_value = "google-drive")]
    pub backend: StoreType,

    /// Disk cache directory (wiped at start-up)
    #[arg(long, env = "YOUPOD_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Number of files kept in the disk cache
    #[arg(long, env = "YOUPOD_CACHE_CAPACITY", default_value_t = crate::cache::disk::DEFAULT_CAPACITY)]
    pub cache_capacity: usize,

    /// Per-request deadline in seconds
    #[arg(long, env = "YOUPOD_REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,

    /// Retries for transient backend failures
    #[arg(long, env = "YOUPOD_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Deadline in seconds for copying one file into the cache
    #[arg(long, env = "YOUPOD_FETCH_TIMEOUT", default_value_t = 600)]
    pub fetch_timeout: u64,

    /// Metadata record directory
    #[arg(long, env = "YOUPOD_METADATA_DIR")]
    pub metadata_dir: Option<PathBuf>,

    /// Seconds a metadata record stays cached in memory
    #[arg(long, env = "YOUPOD_METADATA_TTL", default_value_t = 300)]
    pub metadata_ttl: u64,

    #[arg(long, env = "YOUPOD_DRIVE_API_URL", default_value = DRIVE_API_URL)]
    pub drive_api_url: String,

    #[arg(long, env = "YOUPOD_DRIVE_UPLOAD_URL", default_value = DRIVE_UPLOAD_URL)]
    pub drive_upload_url: String,

    /// Drive folder new uploads are placed in
    #[arg(long, env = "YOUPOD_DRIVE_FOLDER_ID")]
    pub drive_folder_id: Option<String>,
}

impl Config {
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::cache_dir()
                .map(|dir| dir.join("youpod"))
                .context("No cache directory on this platform, pass --cache-dir"),
        }
    }

    pub fn metadata_dir(&self) -> Result<PathBuf> {
        match &self.metadata_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("youpod").join("metadata"))
                .context("No data directory on this platform, pass --metadata-dir"),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(self.request_timeout), self.max_retries)
    }

    pub fn drive_config(&self) -> DriveConfig {
        DriveConfig {
            api_url: self.drive_api_url.clone(),
            upload_url: self.drive_upload_url.clone(),
            folder_id: self.drive_folder_id.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }

    /// Register every backend, each wrapped in the retry policy.
    ///
    /// Drive needs no credentials up front, so it is always available for
    /// files whose metadata names it.
    pub fn build_stores(&self) -> Result<StoreRegistry> {
        let policy = self.retry_policy();
        let drive = DriveStore::new(self.drive_config()).context("Failed to create Drive client")?;

        let mut stores = StoreRegistry::new();
        stores.insert(
            StoreType::GoogleDrive,
            Arc::new(RetryingStore::new(drive, policy.clone())) as Arc<dyn RemoteStore>,
        );
        stores.insert(
            StoreType::Memory,
            Arc::new(RetryingStore::new(InMemoryStore::new(), policy)) as Arc<dyn RemoteStore>,
        );
        Ok(stores)
    }

    /// Assemble a coordinator whose disk cache lives in `cache_dir`
    pub fn build_coordinator(&self, cache_dir: &Path) -> Result<MediaCoordinator> {
        let stores = self.build_stores()?;
        let cache = DiskCache::with_config(
            cache_dir.to_path_buf(),
            self.cache_capacity,
            Duration::from_secs(self.fetch_timeout),
        )
        .with_context(|| format!("Failed to initialize disk cache at {:?}", cache_dir))?;

        let metadata_dir = self.metadata_dir()?;
        let metadata = FsMetadataRepository::new(metadata_dir.clone())
            .with_context(|| format!("Failed to open metadata directory {:?}", metadata_dir))?;

        Ok(MediaCoordinator::new(
            stores,
            Arc::new(cache),
            Arc::new(metadata),
            MetadataCache::with_config(Duration::from_secs(self.metadata_ttl), METADATA_CACHE_ENTRIES),
        ))
    }
}
