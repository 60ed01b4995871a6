//! Best-effort archival of the sweep record.

use async_trait::async_trait;
use lt_types::CellResult;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::SinkDispatchError;
use crate::record::CellRow;

/// Archives cells somewhere other than the local record.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Buffer one cell. Never fails from the caller's point of view.
    fn append(&self, cell: &CellResult);

    /// Finish archiving after the last cell. Returns the archive location on
    /// success.
    async fn seal(&self, local_record: &Path) -> Option<String>;

    fn name(&self) -> &str;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorageSink;

#[async_trait]
impl StorageSink for NoopStorageSink {
    fn append(&self, _cell: &CellResult) {}

    async fn seal(&self, _local_record: &Path) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[derive(Debug, Deserialize)]
struct PresignResponse {
    url: Option<String>,
}

/// Uploads the sweep as CSV through a presign service: ask for a PUT URL,
/// upload, then ask for a GET URL to hand back as the archive location.
pub struct PresignStorageSink {
    client: reqwest::Client,
    base_url: String,
    secret: String,
    bucket: String,
    key_prefix: String,
    buffer: Mutex<csv::Writer<Vec<u8>>>,
}

impl PresignStorageSink {
    const PRESIGN_TIMEOUT: Duration = Duration::from_secs(10);
    const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        bucket: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        if let Err(e) = writer.write_record(CellRow::HEADER) {
            warn!(error = %e, "archive header not buffered");
        }

        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
            buffer: Mutex::new(writer),
        }
    }

    fn enabled(&self) -> bool {
        !self.secret.is_empty()
    }

    fn object_key(&self, local_record: &Path) -> String {
        let file = local_record
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sweep.csv".to_string());
        format!("{}{}", self.key_prefix, file)
    }

    fn buffered(&self) -> Result<Vec<u8>, SinkDispatchError> {
        let mut writer = self.buffer.lock();
        writer.flush().map_err(|e| SinkDispatchError::Encode {
            message: e.to_string(),
        })?;
        Ok(writer.get_ref().clone())
    }

    async fn presign(&self, key: &str, method: &str) -> Result<String, SinkDispatchError> {
        let response: PresignResponse = self
            .client
            .get(format!("{}/presign", self.base_url))
            .query(&[("bucket", self.bucket.as_str()), ("key", key), ("method", method)])
            .bearer_auth(&self.secret)
            .timeout(Self::PRESIGN_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .url
            .filter(|u| !u.is_empty())
            .ok_or(SinkDispatchError::MissingUrl)
    }

    async fn upload(&self, key: &str) -> Result<String, SinkDispatchError> {
        let body = self.buffered()?;
        let upload_url = self.presign(key, "PUT").await?;

        self.client
            .put(&upload_url)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .timeout(Self::UPLOAD_TIMEOUT)
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        self.presign(key, "GET").await
    }
}

#[async_trait]
impl StorageSink for PresignStorageSink {
    fn append(&self, cell: &CellResult) {
        if !self.enabled() {
            return;
        }
        if let Err(e) = self.buffer.lock().serialize(CellRow::from(cell)) {
            warn!(point = %cell.params, error = %e, "cell not buffered for archive");
        }
    }

    async fn seal(&self, local_record: &Path) -> Option<String> {
        if !self.enabled() {
            return None;
        }
        let key = self.object_key(local_record);
        match self.upload(&key).await {
            Ok(location) => {
                info!(%key, "sweep archived");
                Some(location)
            }
            Err(e) => {
                warn!(%key, error = %e, "archive failed");
                None
            }
        }
    }

    fn name(&self) -> &str {
        "presign"
    }
}
