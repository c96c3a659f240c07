use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::SeekFrom;
use std::pin::Pin;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWriteExt};

/// SSH credentials printed by the colab-side setup script.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteCredentials {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Body of `POST /upload_colab`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    #[serde(flatten)]
    pub credentials: RemoteCredentials,
    pub keys_prefix: String,
    #[serde(default)]
    pub script_name: Option<String>,
}

/// Body of `POST /download_colab`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(flatten)]
    pub credentials: RemoteCredentials,
    pub keys_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One multipart part destined for storage, spooled to an anonymous temporary
/// file that disappears when `content` is dropped.
#[derive(Debug)]
pub struct UploadedFile {
    pub name: String,
    pub content: File,
    pub size_bytes: u64,
}

impl UploadedFile {
    pub async fn from_bytes(name: &str, data: &[u8]) -> std::io::Result<Self> {
        let mut spool = FileSpool::new()?;
        spool.write(data).await?;
        spool.finish(name.to_string()).await
    }
}

/// Accumulates an upload chunk by chunk on disk.
pub struct FileSpool {
    file: File,
    size_bytes: u64,
}

impl FileSpool {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            file: File::from_std(tempfile::tempfile()?),
            size_bytes: 0,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.file.write_all(chunk).await?;
        self.size_bytes += chunk.len() as u64;
        Ok(())
    }

    /// Rewinds the spool so it can be read from the start.
    pub async fn finish(mut self, name: String) -> std::io::Result<UploadedFile> {
        self.file.flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(UploadedFile {
            name,
            content: self.file,
            size_bytes: self.size_bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObjectRef {
    pub key: String,
    pub size_bytes: u64,
}

impl StorageObjectRef {
    /// Final path segment of the key; the remote side is flat.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// Object content with the size storage reported for it.
pub struct ObjectBody {
    pub reader: ByteReader,
    pub size_bytes: u64,
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("size_bytes", &self.size_bytes)
            .finish_non_exhaustive()
    }
}

/// Summary of a storage-to-colab delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub prefix: String,
    pub files_delivered: usize,
    pub script_dispatched: Option<String>,
}

impl DeliveryReport {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Successfully uploaded {} file(s) from {}/ to colab",
            self.files_delivered, self.prefix
        );
        if let Some(script) = &self.script_dispatched {
            message.push_str(&format!(" and started execution of {}", script));
        }
        message
    }
}
