//! Google Drive backend

pub mod client;
pub mod types;

pub use client::{DriveClient, DriveConfig, DriveStore};
