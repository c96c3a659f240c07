#![allow(dead_code)]

use async_trait::async_trait;
use colab_bridge::adapters::remote::{build_run_command, verify_remote_size};
use colab_bridge::adapters::sync::DirectorySync;
use colab_bridge::config::BridgeConfig;
use colab_bridge::domain::model::{ObjectBody, RemoteCredentials, StorageObjectRef};
use colab_bridge::domain::ports::{
    ObjectStore, ProcessCommand, ProcessOutput, ProcessRunner, RemoteConnector, RemoteSession,
};
use colab_bridge::{router, BridgeError, BridgeService, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::Notify;

pub const UPLOAD_DIR: &str = "/content/uploaded";

// ---------------------------------------------------------------- storage

#[derive(Default)]
struct StoreState {
    buckets: BTreeSet<String>,
    objects: BTreeMap<(String, String), Vec<u8>>,
    declared_sizes: HashMap<String, u64>,
    fail_put_after: Option<usize>,
    puts: usize,
}

/// In-memory bucket/key store; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().buckets.insert(bucket.to_string());
        store
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
    }

    pub fn read(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Makes `get_object` report `size` for `key` regardless of its content.
    pub fn declare_size(&self, key: &str, size: u64) {
        self.state
            .lock()
            .unwrap()
            .declared_sizes
            .insert(key.to_string(), size);
    }

    pub fn fail_put_after(&self, successful_puts: usize) {
        self.state.lock().unwrap().fail_put_after = Some(successful_puts);
    }

    fn check_bucket(state: &StoreState, bucket: &str) -> Result<()> {
        if state.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(BridgeError::NoSuchBucket {
                bucket: bucket.to_string(),
            })
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        Self::check_bucket(&self.state.lock().unwrap(), bucket)
    }

    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<StorageObjectRef>> {
        let state = self.state.lock().unwrap();
        Self::check_bucket(&state, bucket)?;
        Ok(state
            .objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), v)| StorageObjectRef {
                key: k.clone(),
                size_bytes: v.len() as u64,
            })
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut content: File,
        size_bytes: u64,
    ) -> Result<()> {
        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;
        assert_eq!(data.len() as u64, size_bytes);

        let mut state = self.state.lock().unwrap();
        Self::check_bucket(&state, bucket)?;
        if let Some(limit) = state.fail_put_after {
            if state.puts >= limit {
                return Err(BridgeError::StorageClient {
                    message: format!("PutObject failed: {} rejected", key),
                });
            }
        }
        state.puts += 1;
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let state = self.state.lock().unwrap();
        Self::check_bucket(&state, bucket)?;
        let data = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| BridgeError::StorageClient {
                message: format!("GetObject failed: NoSuchKey {}", key),
            })?;
        let size_bytes = state
            .declared_sizes
            .get(key)
            .copied()
            .unwrap_or(data.len() as u64);
        Ok(ObjectBody {
            reader: Box::pin(std::io::Cursor::new(data)),
            size_bytes,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_bucket(&state, bucket)?;
        state
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------- colab

#[derive(Default)]
pub struct RemoteState {
    pub unreachable: bool,
    /// Files under the upload directory, by name.
    pub uploaded: BTreeMap<String, Vec<u8>>,
    /// Files under `<upload dir>/output`, served by the fake sshfs mount.
    pub output: BTreeMap<String, Vec<u8>>,
    pub executed: Vec<String>,
    pub connects: usize,
    pub closes: usize,
}

#[derive(Clone, Default)]
pub struct FakeColab {
    pub state: Arc<Mutex<RemoteState>>,
}

impl FakeColab {
    pub fn unreachable() -> Self {
        let colab = Self::default();
        colab.state.lock().unwrap().unreachable = true;
        colab
    }

    pub fn add_output(&self, name: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .output
            .insert(name.to_string(), data.to_vec());
    }
}

pub struct FakeSession {
    state: Arc<Mutex<RemoteState>>,
}

#[async_trait]
impl RemoteConnector for FakeColab {
    type Session = FakeSession;

    async fn connect(&self, credentials: &RemoteCredentials) -> Result<FakeSession> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(BridgeError::RemoteConnection {
                host: credentials.host.clone(),
                port: credentials.port,
                message: "Connection refused (os error 111)".into(),
            });
        }
        state.connects += 1;
        Ok(FakeSession {
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn upload_file(&mut self, mut body: ObjectBody, name: &str) -> Result<()> {
        let mut data = Vec::new();
        body.reader.read_to_end(&mut data).await?;
        let actual = data.len() as u64;
        self.state
            .lock()
            .unwrap()
            .uploaded
            .insert(name.to_string(), data);
        verify_remote_size(name, body.size_bytes, actual)
    }

    async fn execute_script(&mut self, script_name: &str) -> Result<()> {
        let command = build_run_command(UPLOAD_DIR, script_name);
        let mut state = self.state.lock().unwrap();
        if let Some(stem) = script_name.strip_suffix(".ipynb") {
            if let Some(notebook) = state.uploaded.remove(script_name) {
                state.uploaded.insert(format!("{}.py", stem), notebook);
            }
        }
        state.executed.push(command);
        Ok(())
    }

    async fn close(self) {
        self.state.lock().unwrap().closes += 1;
    }
}

// ---------------------------------------------------------------- local tools

/// Emulates sshfs/aws/fusermount against a `FakeColab` and a `MemoryStore`.
#[derive(Clone)]
pub struct FakeTools {
    pub colab: FakeColab,
    pub store: MemoryStore,
    pub failing_program: Option<String>,
    /// Fails to spawn, as if the binary were not installed.
    pub missing_program: Option<String>,
    /// When set, `aws` waits for a permit before syncing.
    pub aws_gate: Option<Arc<Notify>>,
    pub seen: Arc<Mutex<Vec<ProcessCommand>>>,
}

impl FakeTools {
    pub fn new(colab: FakeColab, store: MemoryStore) -> Self {
        Self {
            colab,
            store,
            failing_program: None,
            missing_program: None,
            aws_gate: None,
            seen: Arc::default(),
        }
    }

    pub fn programs(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    fn mount(&self, local_dir: &Path) -> std::io::Result<()> {
        let state = self.colab.state.lock().unwrap();
        for (name, data) in &state.output {
            std::fs::write(local_dir.join(name), data)?;
        }
        Ok(())
    }

    fn unmount(&self, local_dir: &Path) -> std::io::Result<()> {
        for entry in std::fs::read_dir(local_dir)? {
            std::fs::remove_file(entry?.path())?;
        }
        Ok(())
    }

    fn sync(&self, local_dir: &Path, destination: &str) -> std::io::Result<()> {
        let target = destination.trim_start_matches("s3://");
        let (bucket, prefix) = target.split_once('/').unwrap_or((target, ""));

        let mut local = BTreeMap::new();
        for entry in std::fs::read_dir(local_dir)? {
            let entry = entry?;
            local.insert(
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path())?,
            );
        }
        for key in self.store.keys(bucket, prefix) {
            let name = &key[prefix.len()..];
            if !local.contains_key(name) {
                let mut state = self.store.state.lock().unwrap();
                state.objects.remove(&(bucket.to_string(), key.clone()));
            }
        }
        for (name, data) in local {
            self.store
                .insert(bucket, &format!("{}{}", prefix, name), &data);
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessRunner for FakeTools {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        self.seen.lock().unwrap().push(command.clone());

        if self.missing_program.as_deref() == Some(command.program.as_str()) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: No such file or directory (os error 2)", command.program),
            )
            .into());
        }
        if self.failing_program.as_deref() == Some(command.program.as_str()) {
            return Ok(ProcessOutput {
                status: Some(1),
                stdout: String::new(),
                stderr: format!("{}: simulated failure", command.program),
            });
        }

        let last = PathBuf::from(command.args.last().cloned().unwrap_or_default());
        match command.program.as_str() {
            "sshfs" => self.mount(&last)?,
            "fusermount" => self.unmount(&last)?,
            "aws" => {
                if let Some(gate) = &self.aws_gate {
                    gate.notified().await;
                }
                let local = PathBuf::from(&command.args[4]);
                self.sync(&local, &command.args[5])?;
            }
            other => panic!("unexpected program {}", other),
        }
        Ok(ProcessOutput {
            status: Some(0),
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------- harness

pub struct TestApp {
    pub base_url: String,
    pub store: MemoryStore,
    pub colab: FakeColab,
    pub tools: FakeTools,
    pub home: TempDir,
    pub client: reqwest::Client,
}

pub fn test_config(home: &Path) -> BridgeConfig {
    BridgeConfig {
        s3_endpoint_url: "http://minio:9000".into(),
        aws_access_key_id: "minio".into(),
        aws_secret_access_key: "minio123".into(),
        home_dir: home.to_path_buf(),
        ..Default::default()
    }
}

pub fn service(
    store: MemoryStore,
    colab: FakeColab,
    tools: FakeTools,
    config: &BridgeConfig,
) -> BridgeService<MemoryStore, FakeColab, FakeTools> {
    BridgeService::new(store, colab, DirectorySync::new(tools, config))
}

impl TestApp {
    pub async fn spawn(store: MemoryStore, colab: FakeColab) -> Self {
        Self::spawn_with(store.clone(), colab.clone(), FakeTools::new(colab, store)).await
    }

    pub async fn spawn_with(store: MemoryStore, colab: FakeColab, tools: FakeTools) -> Self {
        let home = TempDir::new().unwrap();
        let config = test_config(home.path());
        let bridge = service(store.clone(), colab.clone(), tools.clone(), &config);
        let app = router(Arc::new(bridge), &config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            store,
            colab,
            tools,
            home,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/files{}", self.base_url, path)
    }
}

pub fn colab_body(keys_prefix: &str, script_name: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "user": "root",
        "password": "secret",
        "host": "0.tcp.ngrok.io",
        "port": 12345,
        "keys_prefix": keys_prefix,
    });
    if let Some(script) = script_name {
        body["script_name"] = serde_json::Value::String(script.to_string());
    }
    body
}
