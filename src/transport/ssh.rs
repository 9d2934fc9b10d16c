//! Secure-shell transport.
//!
//! Commands and file transfers share one SSH session. With privilege
//! escalation enabled, every shell line is prefixed with a non-interactive
//! `sudo -n`, writes are staged under `/tmp` and moved into place under
//! escalated privilege, and existence checks use a command-level probe
//! instead of an SFTP stat (which would run unprivileged).

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::Transport;
use crate::error::TendError;

/// Connection settings for [`SshTransport`].
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    /// Connect timeout. Does not bound individual commands.
    pub timeout: Duration,
    /// Prefix every shell command with a non-interactive escalation helper.
    pub escalate: bool,
}

impl SshConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: whoami::username(),
            password: None,
            key_path: None,
            timeout: Duration::from_secs(30),
            escalate: false,
        }
    }
}

/// Transport that runs commands on a remote host over SSH.
pub struct SshTransport {
    session: Session,
    config: SshConfig,
}

impl SshTransport {
    /// Connect and authenticate. Public key is preferred, then password,
    /// then the local agent.
    pub fn connect(config: SshConfig) -> Result<Self> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {}:{}", config.host, config.port))?
            .next()
            .with_context(|| format!("no address for {}:{}", config.host, config.port))?;

        let stream = TcpStream::connect_timeout(&addr, config.timeout)
            .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;

        let mut session = Session::new().context("failed to create SSH session")?;
        session.set_tcp_stream(stream);
        session
            .handshake()
            .with_context(|| format!("SSH handshake with {} failed", config.host))?;

        if let Some(key) = &config.key_path {
            session
                .userauth_pubkey_file(&config.user, None, key, None)
                .with_context(|| {
                    format!("public-key authentication failed for {}", config.user)
                })?;
        } else if let Some(password) = &config.password {
            session
                .userauth_password(&config.user, password)
                .with_context(|| format!("password authentication failed for {}", config.user))?;
        } else {
            session
                .userauth_agent(&config.user)
                .with_context(|| format!("agent authentication failed for {}", config.user))?;
        }

        if !session.authenticated() {
            bail!("SSH authentication with {} did not complete", config.host);
        }

        info!(host = %config.host, user = %config.user, "SSH session established");
        Ok(Self { session, config })
    }

    fn exec_line(&self, line: &str) -> Result<(String, i32)> {
        let line = if self.config.escalate {
            format!("sudo -n {line}")
        } else {
            line.to_string()
        };
        debug!(command = %line, host = %self.config.host, "running remote command");

        let mut channel = self
            .session
            .channel_session()
            .context("failed to open SSH channel")?;
        channel
            .exec(&line)
            .with_context(|| format!("failed to execute `{line}`"))?;

        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .context("failed to read remote stdout")?;
        channel
            .stderr()
            .read_to_string(&mut output)
            .context("failed to read remote stderr")?;
        channel.wait_close().context("failed to close SSH channel")?;
        let code = channel.exit_status().context("missing remote exit status")?;
        Ok((output, code))
    }

    /// Staging path with a short deterministic suffix derived from the
    /// destination, so repeated writes to one target reuse one temp name.
    fn staging_path(remote_path: &str) -> String {
        let digest = Sha256::digest(remote_path.as_bytes());
        format!("/tmp/tend-{}.tmp", &hex::encode(digest)[..8])
    }

    fn sftp_write(&self, path: &str, content: &[u8]) -> Result<()> {
        let sftp = self.session.sftp().context("failed to open SFTP channel")?;
        let mut file = sftp
            .create(Path::new(path))
            .with_context(|| format!("failed to create remote file {path}"))?;
        file.write_all(content)
            .with_context(|| format!("failed to write remote file {path}"))?;
        Ok(())
    }

    fn ensure_parent(&self, remote_path: &str) -> Result<()> {
        if let Some(parent) = Path::new(remote_path).parent() {
            let parent = parent.to_string_lossy();
            if !parent.is_empty() && parent != "/" {
                let (output, code) = self.run_command(&["mkdir", "-p", &parent])?;
                if code != 0 {
                    return Err(TendError::CommandFailed {
                        context: format!("failed to create remote directory {parent}"),
                        code,
                        output,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl Transport for SshTransport {
    fn run_shell(&self, command: &str) -> Result<(String, i32)> {
        self.exec_line(command)
    }

    fn run_command(&self, args: &[&str]) -> Result<(String, i32)> {
        let line = shlex::try_join(args.iter().copied())
            .context("failed to quote command arguments")?;
        self.exec_line(&line)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let sftp = self.session.sftp().context("failed to open SFTP channel")?;
        let mut file = sftp.open(Path::new(path)).map_err(|_| TendError::FileNotFound {
            path: path.to_string(),
        })?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .with_context(|| format!("failed to read remote file {path}"))?;
        Ok(content)
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        if self.config.escalate {
            // Stage world-unreachable under /tmp, then move under escalation.
            let staging = Self::staging_path(path);
            self.sftp_write(&staging, content)?;
            self.ensure_parent(path)?;
            let (output, code) = self.run_command(&["mv", &staging, path])?;
            if code != 0 {
                return Err(TendError::CommandFailed {
                    context: format!("failed to move staged file into {path}"),
                    code,
                    output,
                }
                .into());
            }
            Ok(())
        } else {
            self.ensure_parent(path)?;
            self.sftp_write(path, content)
        }
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        if self.config.escalate {
            // A stat over SFTP would run unprivileged; probe with a command.
            let (_, code) = self.run_command(&["test", "-e", path])?;
            Ok(code == 0)
        } else {
            let sftp = self.session.sftp().context("failed to open SFTP channel")?;
            Ok(sftp.stat(Path::new(path)).is_ok())
        }
    }

    fn copy_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let content = std::fs::read(local_path)
            .with_context(|| format!("failed to read {}", local_path.display()))?;
        self.write_file(remote_path, &content)
    }

    fn close(&self) -> Result<()> {
        self.session
            .disconnect(None, "closing", None)
            .context("failed to disconnect SSH session")
    }
}
