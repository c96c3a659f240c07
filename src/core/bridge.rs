use crate::adapters::sync::DirectorySync;
use crate::domain::model::{
    DeliveryReport, DeliveryRequest, StorageObjectRef, SyncRequest, UploadedFile,
};
use crate::domain::ports::{ObjectStore, ProcessRunner, RemoteConnector, RemoteSession};
use crate::utils::error::{BridgeError, Result};
use crate::utils::validation::normalize_prefix;
use std::sync::Arc;

/// Sequences the storage, colab and sync adapters for the three HTTP
/// operations. Each call runs its steps strictly one after another.
pub struct BridgeService<S, C, P>
where
    S: ObjectStore,
    C: RemoteConnector,
    P: ProcessRunner,
{
    store: S,
    connector: C,
    sync: Arc<DirectorySync<P>>,
}

impl<S, C, P> BridgeService<S, C, P>
where
    S: ObjectStore,
    C: RemoteConnector,
    P: ProcessRunner + 'static,
{
    pub fn new(store: S, connector: C, sync: DirectorySync<P>) -> Self {
        Self {
            store,
            connector,
            sync: Arc::new(sync),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces everything under `<prefix>/` with `files`. A failure stops the
    /// batch; files already written stay in place.
    pub async fn upload_to_storage(
        &self,
        bucket: &str,
        keys_prefix: &str,
        files: Vec<UploadedFile>,
    ) -> Result<usize> {
        let prefix = normalize_prefix("keys_prefix", keys_prefix)?;
        self.store.ensure_bucket(bucket).await?;

        let removed = self.store.clear_prefix(bucket, &format!("{}/", prefix)).await?;
        if removed > 0 {
            tracing::info!("removed {} existing object(s) under {}/", removed, prefix);
        }

        let count = files.len();
        for file in files {
            let key = format!("{}/{}", prefix, file.name);
            self.store
                .put_object(bucket, &key, file.content, file.size_bytes)
                .await?;
        }

        tracing::info!("Files were uploaded to {} with prefix {}", bucket, prefix);
        Ok(count)
    }

    /// Copies every object under `<prefix>/` to the colab upload directory and
    /// optionally starts `script_name` there.
    pub async fn deliver_to_remote(
        &self,
        bucket: &str,
        request: &DeliveryRequest,
    ) -> Result<DeliveryReport> {
        let prefix = normalize_prefix("keys_prefix", &request.keys_prefix)?;
        let script = request
            .script_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        self.store.ensure_bucket(bucket).await?;
        let objects: Vec<StorageObjectRef> = self
            .store
            .list_prefix(bucket, &format!("{}/", prefix))
            .await?
            .into_iter()
            .filter(|object| !object.file_name().is_empty())
            .collect();

        if let Some(script) = script {
            if !objects.iter().any(|object| object.file_name() == script) {
                return Err(BridgeError::ScriptNotFound {
                    script: script.to_string(),
                    prefix: format!("{}/", prefix),
                });
            }
        }

        let mut session = self.connector.connect(&request.credentials).await?;
        let outcome = self
            .deliver_with_session(&mut session, bucket, &objects, script)
            .await;
        session.close().await;
        outcome?;

        tracing::info!("Files from {}/ were uploaded to colab", prefix);
        Ok(DeliveryReport {
            prefix,
            files_delivered: objects.len(),
            script_dispatched: script.map(str::to_string),
        })
    }

    async fn deliver_with_session(
        &self,
        session: &mut C::Session,
        bucket: &str,
        objects: &[StorageObjectRef],
        script: Option<&str>,
    ) -> Result<()> {
        for object in objects {
            let body = self.store.get_object(bucket, &object.key).await?;
            session.upload_file(body, object.file_name()).await?;
        }

        if let Some(script) = script {
            session.execute_script(script).await?;
            tracing::info!("Successfully start execution of script {}", script);
        }
        Ok(())
    }

    /// Mirrors the colab output directory into `<prefix>/output/`.
    pub async fn sync_from_remote(&self, bucket: &str, request: &SyncRequest) -> Result<String> {
        let prefix = normalize_prefix("keys_prefix", &request.keys_prefix)?;
        self.store.ensure_bucket(bucket).await?;

        // Owned by a task of its own so a dropped request cannot interrupt
        // the mount before its unmount.
        let sync = Arc::clone(&self.sync);
        let credentials = request.credentials.clone();
        let (target_bucket, target_prefix) = (bucket.to_string(), prefix.clone());
        tokio::spawn(async move {
            sync.mirror_remote_output(&credentials, &target_bucket, &target_prefix)
                .await
        })
        .await
        .map_err(|err| BridgeError::Io(std::io::Error::other(err)))??;

        let message = format!(
            "Successfully synced colab output to s3://{}/{}/output/",
            bucket, prefix
        );
        tracing::info!("{}", message);
        Ok(message)
    }
}
