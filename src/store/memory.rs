//! In-memory remote store
//!
//! Keeps objects in process memory. Used for local runs without a Drive
//! account and as the backend in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::reader::{RangeSource, SeekableRemoteReader};
use super::{require_id, RemoteStore, StoreError};
use crate::media::MediaFile;
use crate::principal::Principal;

#[derive(Default)]
struct Objects {
    data: RwLock<HashMap<String, Bytes>>,
}

#[async_trait]
impl RangeSource for Objects {
    async fn fetch_range(
        &self,
        _principal: &Principal,
        file_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StoreError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let object = data
            .get(file_id)
            .ok_or_else(|| StoreError::NotFound(file_id.to_string()))?;

        let len = object.len() as u64;
        if start >= len {
            return Ok(Bytes::new());
        }
        let end = end.min(len - 1);
        Ok(object.slice(start as usize..=end as usize))
    }
}

/// RemoteStore backed by a HashMap
#[derive(Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<Objects>,
    opens: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly, bypassing `save`
    pub fn insert(&self, file_id: impl Into<String>, content: impl Into<Bytes>) {
        let mut data = self.objects.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(file_id.into(), content.into());
    }

    pub fn remove(&self, file_id: &str) -> Option<Bytes> {
        let mut data = self.objects.data.write().unwrap_or_else(PoisonError::into_inner);
        data.remove(file_id)
    }

    pub fn contains(&self, file_id: &str) -> bool {
        let data = self.objects.data.read().unwrap_or_else(PoisonError::into_inner);
        data.contains_key(file_id)
    }

    /// Number of successful `get` calls so far
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        let data = self.objects.data.read().unwrap_or_else(PoisonError::into_inner);
        data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn generate_id(&self, _principal: &Principal) -> Result<String, StoreError> {
        Ok(uuid::Uuid::new_v4().simple().to_string())
    }

    async fn save(&self, principal: &Principal, file: &MediaFile) -> Result<(), StoreError> {
        let id = require_id(file)?;
        principal.ensure_fresh()?;
        self.insert(id, file.content.clone());
        debug!(file_id = id, size = file.content.len(), "Stored object in memory");
        Ok(())
    }

    async fn get(
        &self,
        principal: &Principal,
        file_id: &str,
    ) -> Result<SeekableRemoteReader, StoreError> {
        principal.ensure_fresh()?;
        let size = {
            let data = self.objects.data.read().unwrap_or_else(PoisonError::into_inner);
            data.get(file_id)
                .map(|b| b.len() as u64)
                .ok_or_else(|| StoreError::NotFound(file_id.to_string()))?
        };
        self.opens.fetch_add(1, Ordering::Relaxed);

        let source: Arc<dyn RangeSource> = self.objects.clone();
        Ok(SeekableRemoteReader::new(
            source,
            principal.clone(),
            file_id,
            size,
        ))
    }
}
