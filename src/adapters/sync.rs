use crate::config::BridgeConfig;
use crate::domain::model::RemoteCredentials;
use crate::domain::ports::{ProcessCommand, ProcessOutput, ProcessRunner};
use crate::utils::error::{BridgeError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Mirrors the colab output directory into storage by mounting it with sshfs
/// and running `aws s3 sync --delete` against the mount.
#[derive(Debug, Clone)]
pub struct DirectorySync<P: ProcessRunner> {
    runner: P,
    home_dir: PathBuf,
    remote_output_dir: String,
    endpoint_url: String,
    access_key_id: String,
    secret_access_key: String,
    sshfs_bin: String,
    aws_bin: String,
    fusermount_bin: String,
}

impl<P: ProcessRunner> DirectorySync<P> {
    pub fn new(runner: P, config: &BridgeConfig) -> Self {
        Self {
            runner,
            home_dir: config.home_dir.clone(),
            remote_output_dir: config.remote_output_dir(),
            endpoint_url: config.s3_endpoint_url.clone(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
            sshfs_bin: config.sshfs_bin.clone(),
            aws_bin: config.aws_bin.clone(),
            fusermount_bin: config.fusermount_bin.clone(),
        }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.home_dir.join(".aws").join("credentials")
    }

    /// Writes the aws CLI credentials file if it is missing. An existing file
    /// is never touched.
    pub fn ensure_credentials_file(&self) -> Result<PathBuf> {
        let path = self.credentials_path();
        if path.is_file() {
            tracing::debug!("AWS credentials file already present at {}", path.display());
            return Ok(path);
        }

        tracing::info!("Creating credentials file at {}", path.display());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = format!(
            "[default]\naws_access_key_id={}\naws_secret_access_key={}\n",
            self.access_key_id, self.secret_access_key
        );
        fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(path)
    }

    pub fn mount_command(&self, local_dir: &Path, credentials: &RemoteCredentials) -> ProcessCommand {
        ProcessCommand::new(&self.sshfs_bin)
            .arg("-o")
            .arg("StrictHostKeyChecking=no,password_stdin")
            .arg("-p")
            .arg(credentials.port.to_string())
            .arg(format!(
                "{}@{}:{}",
                credentials.user, credentials.host, self.remote_output_dir
            ))
            .arg(local_dir.display().to_string())
            .stdin(credentials.password.clone())
    }

    pub fn sync_command(
        &self,
        local_dir: &Path,
        bucket: &str,
        prefix: &str,
        credentials_file: &Path,
    ) -> ProcessCommand {
        ProcessCommand::new(&self.aws_bin)
            .arg("--endpoint-url")
            .arg(&self.endpoint_url)
            .arg("s3")
            .arg("sync")
            .arg(local_dir.display().to_string())
            .arg(format!("s3://{}/{}/output/", bucket, prefix))
            .arg("--delete")
            .env("AWS_SHARED_CREDENTIALS_FILE", credentials_file)
    }

    pub fn unmount_command(&self, local_dir: &Path) -> ProcessCommand {
        ProcessCommand::new(&self.fusermount_bin)
            .arg("-u")
            .arg(local_dir.display().to_string())
    }

    pub async fn mount_remote_output(
        &self,
        local_dir: &Path,
        credentials: &RemoteCredentials,
    ) -> Result<()> {
        let command = self.mount_command(local_dir, credentials);
        self.run_checked(&command).await.map_err(|err| {
            tracing::warn!("sshfs connection error: {}", err);
            err
        })?;
        tracing::info!(
            "mounted {}:{} at {}",
            credentials.host,
            self.remote_output_dir,
            local_dir.display()
        );
        Ok(())
    }

    /// Scratch mount point under the home directory.
    pub fn scratch_dir(&self) -> Result<TempDir> {
        let workdir = tempfile::Builder::new()
            .prefix("colab-output-")
            .tempdir_in(&self.home_dir)?;
        Ok(workdir)
    }

    /// Credentials file, scratch directory, mount, then reconcile. Both the
    /// mount and the directory are gone when this returns.
    pub async fn mirror_remote_output(
        &self,
        credentials: &RemoteCredentials,
        bucket: &str,
        prefix: &str,
    ) -> Result<()> {
        let credentials_file = self.ensure_credentials_file()?;
        let workdir = self.scratch_dir()?;
        self.mount_remote_output(workdir.path(), credentials).await?;
        self.reconcile_to_storage(workdir, bucket, prefix, &credentials_file)
            .await
    }

    /// Makes `s3://<bucket>/<prefix>/output/` mirror the mounted `workdir`,
    /// then unmounts it whether or not the sync succeeded. The directory is
    /// only removed once the unmount went through; otherwise it is left on
    /// disk so nothing is deleted through a live mount.
    pub async fn reconcile_to_storage(
        &self,
        workdir: TempDir,
        bucket: &str,
        prefix: &str,
        credentials_file: &Path,
    ) -> Result<()> {
        let command = self.sync_command(workdir.path(), bucket, prefix, credentials_file);
        let result = self.run_checked(&command).await;
        if let Err(err) = &result {
            tracing::warn!("Files synchronization error: {}", err);
        }

        if !self.unmount(workdir.path()).await {
            let kept = workdir.keep();
            tracing::warn!(
                "{} may still be mounted; leaving it in place",
                kept.display()
            );
        }
        result.map(|output| {
            tracing::debug!("aws s3 sync output: {}", output.stdout.trim());
        })
    }

    async fn unmount(&self, local_dir: &Path) -> bool {
        let command = self.unmount_command(local_dir);
        match self.runner.run(&command).await {
            Ok(output) if output.success() => {
                tracing::info!("Remote directory successfully unmounted");
                true
            }
            Ok(output) => {
                tracing::warn!(
                    "`{}` ended with {}: {}",
                    command,
                    output.status_label(),
                    output.stderr.trim()
                );
                false
            }
            Err(err) => {
                tracing::warn!("could not run `{}`: {}", command, err);
                false
            }
        }
    }

    /// Spawn failures (a missing binary, for instance) are reported like a
    /// non-zero exit.
    async fn run_checked(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        let output = self
            .runner
            .run(command)
            .await
            .map_err(|err| BridgeError::Process {
                command: command.to_string(),
                status: "not started".to_string(),
                stderr: err.to_string(),
            })?;
        if !output.success() {
            return Err(BridgeError::Process {
                command: command.to_string(),
                status: output.status_label(),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}
