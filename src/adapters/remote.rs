use crate::config::BridgeConfig;
use crate::domain::model::{ObjectBody, RemoteCredentials};
use crate::domain::ports::{RemoteConnector, RemoteSession};
use crate::utils::error::{BridgeError, Result};
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const STDERR_TAIL_LIMIT: usize = 4096;

/// Colab runtimes are recreated constantly, so host keys are accepted as-is.
struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

pub(crate) fn sh_escape(value: &str) -> String {
    let mut out = String::from("'");
    out.push_str(&value.replace('\'', r"'\''"));
    out.push('\'');
    out
}

/// `python <script>`, or for notebooks the unconditional chain
/// `jupyter nbconvert <nb> --to python; rm <nb>; python <nb as .py>`.
pub fn build_run_command(upload_dir: &str, script_name: &str) -> String {
    let script_path = format!("{}/{}", upload_dir.trim_end_matches('/'), script_name);
    let path = Path::new(&script_path);
    if path.extension().and_then(|ext| ext.to_str()) == Some("ipynb") {
        let converted = path.with_extension("py").display().to_string();
        return format!(
            "jupyter nbconvert {nb} --to python; rm {nb}; python {py}",
            nb = sh_escape(&script_path),
            py = sh_escape(&converted),
        );
    }
    format!("python {}", sh_escape(&script_path))
}

/// The post-transfer check: the size the remote side reports must equal the
/// size storage declared.
pub fn verify_remote_size(name: &str, expected: u64, actual: u64) -> Result<()> {
    if expected != actual {
        tracing::warn!("File {} was corrupted during upload", name);
        return Err(BridgeError::FileIntegrity {
            file: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// What a dispatched script reported before its channel went away.
#[derive(Debug, Default)]
struct ScriptWatch {
    stderr: Vec<u8>,
    exit: Option<u32>,
}

impl ScriptWatch {
    /// Returns `false` once the channel is closed.
    fn observe(&mut self, msg: ChannelMsg) -> bool {
        match msg {
            ChannelMsg::ExtendedData { data, ext: 1 } => {
                self.stderr.extend_from_slice(&data);
                if self.stderr.len() > STDERR_TAIL_LIMIT {
                    self.stderr.drain(..self.stderr.len() - STDERR_TAIL_LIMIT);
                }
            }
            ChannelMsg::ExitStatus { exit_status } => self.exit = Some(exit_status),
            ChannelMsg::Close => return false,
            _ => {}
        }
        true
    }

    fn report(&self, script: &str) -> String {
        match self.exit {
            Some(0) => format!("script {} finished", script),
            Some(code) => format!(
                "Script execution error: {} exited with {}: {}",
                script,
                code,
                String::from_utf8_lossy(&self.stderr).trim()
            ),
            None => format!(
                "colab session closed before script {} reported an exit status",
                script
            ),
        }
    }
}

#[derive(Clone)]
pub struct SshConnector {
    upload_dir: String,
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            upload_dir: config.remote_upload_dir.trim_end_matches('/').to_string(),
            config: Arc::new(client::Config::default()),
        }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, credentials: &RemoteCredentials) -> Result<SshSession> {
        let addr = (credentials.host.as_str(), credentials.port);
        let mut handle = client::connect(self.config.clone(), addr, ClientHandler)
            .await
            .map_err(|err| {
                tracing::warn!("Colab SSH connection error: {}", err);
                BridgeError::RemoteConnection {
                    host: credentials.host.clone(),
                    port: credentials.port,
                    message: err.to_string(),
                }
            })?;

        let auth = handle
            .authenticate_password(credentials.user.clone(), credentials.password.clone())
            .await?;
        if !auth.success() {
            tracing::warn!(
                "Colab SSH authentication rejected for {}@{}",
                credentials.user,
                credentials.host
            );
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(BridgeError::RemoteAuth {
                user: credentials.user.clone(),
            });
        }

        tracing::info!(
            "connected to colab {}@{}:{}",
            credentials.user,
            credentials.host,
            credentials.port
        );
        Ok(SshSession {
            handle: Mutex::new(handle),
            upload_dir: self.upload_dir.clone(),
            upload_dir_ready: false,
        })
    }
}

/// One authenticated connection, owned by a single request and disconnected
/// when that request ends.
pub struct SshSession {
    handle: Mutex<Handle<ClientHandler>>,
    upload_dir: String,
    upload_dir_ready: bool,
}

impl SshSession {
    async fn sftp(&self) -> Result<SftpSession> {
        let channel = self.handle.lock().await.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(sftp)
    }

    /// Runs `cmd` and waits for its exit status.
    async fn exec_wait(&self, cmd: &str) -> Result<(i32, String)> {
        let mut channel = self.handle.lock().await.channel_open_session().await?;
        channel.exec(true, cmd).await?;

        let mut code = 0;
        let mut stderr = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => code = exit_status as i32,
                ChannelMsg::Close => break,
                _ => {}
            }
        }
        let _ = channel.close().await;
        Ok((code, String::from_utf8_lossy(&stderr).into_owned()))
    }

    async fn ensure_upload_dir(&mut self) -> Result<()> {
        if self.upload_dir_ready {
            return Ok(());
        }
        let (code, stderr) = self
            .exec_wait(&format!("mkdir -p {}", sh_escape(&self.upload_dir)))
            .await?;
        if code != 0 {
            tracing::warn!(
                "mkdir -p {} exited with {}: {}",
                self.upload_dir,
                code,
                stderr.trim()
            );
        }
        self.upload_dir_ready = true;
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn upload_file(&mut self, mut body: ObjectBody, name: &str) -> Result<()> {
        self.ensure_upload_dir().await?;
        let remote_path = format!("{}/{}", self.upload_dir, name);

        let sftp = self.sftp().await?;
        let mut file = sftp.create(remote_path.as_str()).await?;
        let written = tokio::io::copy(&mut body.reader, &mut file)
            .await
            .map_err(|err| BridgeError::Session {
                message: format!("transfer of {} failed: {}", name, err),
            })?;
        file.shutdown().await.map_err(|err| BridgeError::Session {
            message: format!("closing {} failed: {}", remote_path, err),
        })?;

        let remote_size = sftp.metadata(remote_path.as_str()).await?.size.unwrap_or(0);
        tracing::debug!(
            "{}: streamed {} bytes, remote reports {}",
            remote_path,
            written,
            remote_size
        );
        verify_remote_size(name, body.size_bytes, remote_size)
    }

    async fn execute_script(&mut self, script_name: &str) -> Result<()> {
        let command = build_run_command(&self.upload_dir, script_name);
        if script_name.ends_with(".ipynb") {
            tracing::info!("Convert script {} from ipynb to py", script_name);
        }

        let opened = self.handle.lock().await.channel_open_session().await;
        let mut channel = match opened {
            Ok(channel) => channel,
            Err(err) => {
                tracing::warn!("Script execution error: {}", err);
                return Ok(());
            }
        };
        if let Err(err) = channel.exec(true, command.as_str()).await {
            tracing::warn!("Script execution error: {}", err);
            return Ok(());
        }
        tracing::info!("dispatched `{}`", command);

        // The watcher only holds the channel. When the request closes the
        // session the channel ends and the watcher logs what it saw.
        let script = script_name.to_string();
        tokio::spawn(async move {
            let mut watch = ScriptWatch::default();
            while let Some(msg) = channel.wait().await {
                if !watch.observe(msg) {
                    break;
                }
            }
            match watch.exit {
                Some(0) => tracing::info!("{}", watch.report(&script)),
                _ => tracing::warn!("{}", watch.report(&script)),
            }
        });
        Ok(())
    }

    async fn close(self) {
        let handle = self.handle.into_inner();
        match handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            Ok(()) => tracing::debug!("colab session closed"),
            Err(err) => tracing::debug!("error while closing colab session: {}", err),
        }
    }
}
