//! Principal - the user context backend calls are made under
//!
//! Token acquisition and refresh live outside this daemon. A principal only
//! carries the bearer credential it was handed and knows whether it expired.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{StoreError, StoreType};

/// Authenticated user context for remote store calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    /// Account name, also used in served URLs
    pub username: String,
    /// Bearer token for the user's backend
    pub access_token: String,
    /// When the access token stops being accepted (None = unknown)
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Backend new uploads go to
    #[serde(default)]
    pub default_store: StoreType,
}

impl Principal {
    pub fn new(username: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            access_token: access_token.into(),
            expires_at: None,
            default_store: StoreType::default(),
        }
    }

    pub fn with_default_store(mut self, store: StoreType) -> Self {
        self.default_store = store;
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    /// Fail with `AuthExpired` if the credential is known to be stale
    pub fn ensure_fresh(&self) -> Result<(), StoreError> {
        if self.is_expired() {
            return Err(StoreError::AuthExpired(self.username.clone()));
        }
        Ok(())
    }

    /// Authorization header value for backend requests
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Principals known to the HTTP server, keyed by username
#[derive(Debug, Default, Clone)]
pub struct PrincipalDirectory {
    principals: HashMap<String, Principal>,
}

#[derive(Deserialize)]
struct PrincipalRecord {
    access_token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    default_store: StoreType,
}

impl PrincipalDirectory {
    /// Load a JSON object of `{ "username": { "access_token": ..., "expires_at": ... } }`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read principals file: {:?}", path))?;
        let directory = Self::from_json(&raw)
            .with_context(|| format!("Failed to parse principals file: {:?}", path))?;

        info!(path = %path.display(), count = directory.len(), "Loaded principals");
        Ok(directory)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let records: HashMap<String, PrincipalRecord> = serde_json::from_str(raw)?;
        let principals = records
            .into_iter()
            .map(|(username, record)| {
                let principal = Principal {
                    username: username.clone(),
                    access_token: record.access_token,
                    expires_at: record.expires_at,
                    default_store: record.default_store,
                };
                (username, principal)
            })
            .collect();
        Ok(Self { principals })
    }

    pub fn insert(&mut self, principal: Principal) {
        self.principals.insert(principal.username.clone(), principal);
    }

    pub fn get(&self, username: &str) -> Option<&Principal> {
        self.principals.get(username)
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}
