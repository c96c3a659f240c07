use crate::domain::model::{ObjectBody, RemoteCredentials, StorageObjectRef};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tokio::fs::File;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fails with `NoSuchBucket` when the bucket is absent.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;
    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageObjectRef>>;
    /// Streams `size_bytes` bytes of `content`, read from its current position.
    async fn put_object(&self, bucket: &str, key: &str, content: File, size_bytes: u64)
        -> Result<()>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Deletes every key under `prefix`, stopping at the first failure.
    async fn clear_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let objects = self.list_prefix(bucket, prefix).await?;
        for object in &objects {
            self.delete_object(bucket, &object.key).await?;
        }
        Ok(objects.len())
    }
}

#[async_trait]
pub trait RemoteConnector: Send + Sync {
    type Session: RemoteSession;

    async fn connect(&self, credentials: &RemoteCredentials) -> Result<Self::Session>;
}

#[async_trait]
pub trait RemoteSession: Send {
    /// Writes `body` as `<upload dir>/<name>` and checks the stored size.
    async fn upload_file(&mut self, body: ObjectBody, name: &str) -> Result<()>;

    /// Starts the script without waiting for it; the outcome is only logged.
    async fn execute_script(&mut self, script_name: &str) -> Result<()>;

    /// Releases the connection. Never fails; problems are logged.
    async fn close(self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub envs: Vec<(String, PathBuf)>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<PathBuf>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn status_label(&self) -> String {
        match self.status {
            Some(code) => format!("exit status {}", code),
            None => "termination by signal".to_string(),
        }
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs to completion. Only spawn failures are errors; a non-zero exit is
    /// reported through `ProcessOutput::status`.
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput>;
}
