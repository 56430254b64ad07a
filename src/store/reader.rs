//! Seekable reader over a range-only backend
//!
//! The backend can only answer "give me bytes a..=b of object X". The reader
//! tracks a logical offset and turns every `read` into one range request.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use super::errors::StoreError;
use crate::principal::Principal;

/// A backend transport that can fetch an inclusive byte window of an object
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Fetch bytes `start..=end` of `file_id`
    async fn fetch_range(
        &self,
        principal: &Principal,
        file_id: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StoreError>;
}

/// Reject a range response that came back shorter than requested
pub(crate) fn ensure_full_range(
    bytes: &Bytes,
    file_id: &str,
    start: u64,
    end: u64,
) -> Result<(), StoreError> {
    let expected = end - start + 1;
    if (bytes.len() as u64) < expected {
        return Err(StoreError::BackendUnavailable(format!(
            "short read for '{}': got {} of {} bytes at offset {}",
            file_id,
            bytes.len(),
            expected,
            start
        )));
    }
    Ok(())
}

/// Random-access reader for one remote object.
///
/// Methods take `&mut self`, so a reader has exactly one consumer at a time.
pub struct SeekableRemoteReader {
    source: Arc<dyn RangeSource>,
    principal: Principal,
    file_id: String,
    size: u64,
    offset: u64,
}

impl SeekableRemoteReader {
    /// Create a reader positioned at the start of the object
    ///
    /// # Arguments
    /// * `size` - Total object size, taken from backend metadata at open time
    pub fn new(
        source: Arc<dyn RangeSource>,
        principal: Principal,
        file_id: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            source,
            principal,
            file_id: file_id.into(),
            size,
            offset: 0,
        }
    }

    /// Replace the transport, keeping identity and position
    pub(crate) fn map_source<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Arc<dyn RangeSource>) -> Arc<dyn RangeSource>,
    {
        self.source = f(self.source);
        self
    }

    pub fn identifier(&self) -> &str {
        &self.file_id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Read up to `buf.len()` bytes at the current offset.
    ///
    /// Returns `Ok(0)` at or past the end of the object. A short response is
    /// reported as `BackendUnavailable` and the offset is not advanced, so the
    /// whole read can be retried.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StoreError> {
        if self.offset >= self.size || buf.is_empty() {
            return Ok(0);
        }

        self.principal.ensure_fresh()?;

        let want = (buf.len() as u64).min(self.size - self.offset);
        let start = self.offset;
        let end = start + want - 1;

        let bytes = self
            .source
            .fetch_range(&self.principal, &self.file_id, start, end)
            .await?;
        ensure_full_range(&bytes, &self.file_id, start, end)?;

        let n = want as usize;
        buf[..n].copy_from_slice(&bytes[..n]);
        self.offset += want;

        trace!(file_id = %self.file_id, start, len = n, "Range read");
        Ok(n)
    }

    /// Move the logical offset.
    ///
    /// Seeking past the end is allowed; a negative target is rejected and
    /// leaves the offset unchanged.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, StoreError> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
        };

        match target {
            Some(abs) => {
                self.offset = abs;
                Ok(abs)
            }
            None => Err(StoreError::InvalidArgument(format!(
                "seek to {:?} on '{}' lands at a negative position",
                pos, self.file_id
            ))),
        }
    }

    /// Read the remainder of the object into memory
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, StoreError> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }
}

impl std::fmt::Debug for SeekableRemoteReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeekableRemoteReader")
            .field("file_id", &self.file_id)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves windows of a fixed buffer and records request count
    struct VecSource {
        data: Bytes,
        requests: AtomicUsize,
        truncate_by: usize,
    }

    impl VecSource {
        fn new(data: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                data: Bytes::from(data),
                requests: AtomicUsize::new(0),
                truncate_by: 0,
            })
        }
    }

    #[async_trait]
    impl RangeSource for VecSource {
        async fn fetch_range(
            &self,
            _principal: &Principal,
            _file_id: &str,
            start: u64,
            end: u64,
        ) -> Result<Bytes, StoreError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let end = (end as usize + 1).min(self.data.len());
            let end = end.saturating_sub(self.truncate_by).max(start as usize);
            Ok(self.data.slice(start as usize..end))
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn reader_over(data: Vec<u8>) -> (Arc<VecSource>, SeekableRemoteReader) {
        let size = data.len() as u64;
        let source = VecSource::new(data);
        let reader =
            SeekableRemoteReader::new(source.clone(), Principal::new("alice", "t"), "obj", size);
        (source, reader)
    }

    #[tokio::test]
    async fn test_sequential_read_matches_content() {
        let data = sample(10_000);
        let (_, mut reader) = reader_over(data.clone());

        let mut out = Vec::new();
        let mut buf = [0u8; 777];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
        assert_eq!(reader.position(), 10_000);
    }

    #[tokio::test]
    async fn test_read_issues_one_request_per_call() {
        let (source, mut reader) = reader_over(sample(100));
        let mut buf = [0u8; 40];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 40);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 40);
        // Final window is clamped to the object size
        assert_eq!(reader.read(&mut buf).await.unwrap(), 20);
        assert_eq!(source.requests.load(Ordering::SeqCst), 3);

        // End of stream does not hit the backend
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(source.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_seek_then_read_matches_offsets() {
        let data = sample(4096);
        let (_, mut reader) = reader_over(data.clone());
        let mut buf = [0u8; 100];

        let steps = [
            SeekFrom::Start(1000),
            SeekFrom::Current(-500),
            SeekFrom::End(-100),
            SeekFrom::Start(0),
            SeekFrom::Current(3000),
        ];
        for step in steps {
            let pos = reader.seek(step).unwrap() as usize;
            let n = reader.read(&mut buf).await.unwrap();
            let expected_len = 100.min(data.len() - pos);
            assert_eq!(n, expected_len);
            assert_eq!(&buf[..n], &data[pos..pos + n]);
            assert_eq!(reader.position() as usize, pos + n);
        }
    }

    #[tokio::test]
    async fn test_seek_to_end_reads_eof() {
        let (_, mut reader) = reader_over(sample(50));
        assert_eq!(reader.seek(SeekFrom::End(0)).unwrap(), 50);
        let mut buf = [0u8; 10];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seek_past_end_is_allowed() {
        let (_, mut reader) = reader_over(sample(50));
        assert_eq!(reader.seek(SeekFrom::Start(500)).unwrap(), 500);
        let mut buf = [0u8; 10];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_negative_seek_is_rejected() {
        let (_, mut reader) = reader_over(sample(50));
        reader.seek(SeekFrom::Start(20)).unwrap();

        assert!(matches!(
            reader.seek(SeekFrom::Current(-21)),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            reader.seek(SeekFrom::End(-51)),
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(reader.position(), 20);
    }

    #[tokio::test]
    async fn test_short_read_is_backend_unavailable() {
        let data = sample(100);
        let source = Arc::new(VecSource {
            data: Bytes::from(data),
            requests: AtomicUsize::new(0),
            truncate_by: 5,
        });
        let mut reader = SeekableRemoteReader::new(source, Principal::new("a", "t"), "obj", 100);

        let mut buf = [0u8; 30];
        assert!(matches!(
            reader.read(&mut buf).await,
            Err(StoreError::BackendUnavailable(_))
        ));
        assert_eq!(reader.position(), 0);
    }

    #[tokio::test]
    async fn test_expired_principal_fails_read() {
        let source = VecSource::new(sample(10));
        let principal =
            Principal::new("alice", "t").with_expiry(chrono::Utc::now() - chrono::Duration::seconds(5));
        let mut reader = SeekableRemoteReader::new(source.clone(), principal, "obj", 10);

        let mut buf = [0u8; 4];
        assert!(matches!(
            reader.read(&mut buf).await,
            Err(StoreError::AuthExpired(_))
        ));
        assert_eq!(source.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_read_to_end() {
        let data = sample(200_000);
        let (_, mut reader) = reader_over(data.clone());
        reader.seek(SeekFrom::Start(1)).unwrap();
        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).await.unwrap(), 199_999);
        assert_eq!(out, &data[1..]);
    }
}
