use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{check_known_hosts, Algorithm, PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect, Pty};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWriteExt;

use crate::auth::{AuthMethod, Identity};
use crate::error::ConvoyError;
use crate::fleet::Host;
use crate::prompt::{Action, PromptScanner};
use crate::report::HostReporter;

/// Server host-key policy. `TrustAll` is the fleet default, preserved from
/// the tool's history: the operator fleet is assumed pre-trusted and no
/// host identity is verified. Pass `--verify-host-keys` for `KnownHosts`,
/// which checks `~/.ssh/known_hosts` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostVerification {
    TrustAll,
    KnownHosts,
}

/// One authenticated connection to a host.
///
/// Dispatch only sees this trait and [`Connector`], so tests drive the
/// whole fan-out with mock connections instead of live SSH.
#[async_trait]
pub trait Connection: Send {
    /// Copy a local file to `remote` over a dedicated transfer sub-session
    /// on the same connection.
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), ConvoyError>;

    /// Run one joined command line inside an interactive pseudo-terminal,
    /// streaming output and answering prompts until the stream closes.
    async fn run(&self, line: &str) -> Result<(), ConvoyError>;

    /// Terminate the connection.
    async fn close(self: Box<Self>);
}

/// Opens one [`Connection`] per host.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        name: &str,
        host: &Host,
        identity: &Identity,
        reporter: HostReporter,
    ) -> Result<Box<dyn Connection>, ConvoyError>;
}

struct ClientHandler {
    hostname: String,
    port: u16,
    verify: HostVerification,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.verify {
            HostVerification::TrustAll => Ok(true),
            HostVerification::KnownHosts => Ok(check_known_hosts(
                &self.hostname,
                self.port,
                server_public_key,
            )
            .unwrap_or(false)),
        }
    }
}

/// The real connector: dials `addr:port` and authenticates with the
/// resolved identity.
pub struct SshConnector {
    verify: HostVerification,
}

impl SshConnector {
    pub fn new(verify: HostVerification) -> Self {
        Self { verify }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        _name: &str,
        host: &Host,
        identity: &Identity,
        reporter: HostReporter,
    ) -> Result<Box<dyn Connection>, ConvoyError> {
        let config = Arc::new(client::Config::default());
        let handler = ClientHandler {
            hostname: host.addr.trim().to_string(),
            port: host.effective_port().parse().unwrap_or(22),
            verify: self.verify,
        };
        let mut handle = client::connect(config, host.target(), handler)
            .await
            .map_err(ConvoyError::Connect)?;

        match &identity.method {
            AuthMethod::Password(password) => {
                let result = handle
                    .authenticate_password(&identity.user, password)
                    .await
                    .map_err(ConvoyError::Auth)?;
                if !result.success() {
                    return Err(ConvoyError::AuthRejected {
                        user: identity.user.clone(),
                    });
                }
            }
            AuthMethod::Key(key) => {
                // RSA keys need a hash algorithm negotiated with the server.
                let hash_alg = match key.algorithm() {
                    Algorithm::Rsa { .. } => handle
                        .best_supported_rsa_hash()
                        .await
                        .map_err(ConvoyError::Auth)?
                        .flatten(),
                    _ => None,
                };
                let result = handle
                    .authenticate_publickey(
                        &identity.user,
                        PrivateKeyWithHashAlg::new(key.clone(), hash_alg),
                    )
                    .await
                    .map_err(ConvoyError::Auth)?;
                if !result.success() {
                    return Err(ConvoyError::AuthRejected {
                        user: identity.user.clone(),
                    });
                }
            }
        }

        reporter.notice("Connected to host.");
        Ok(Box::new(SshConnection {
            handle,
            reporter,
            sudo_password: identity.sudo_password().to_string(),
        }))
    }
}

fn transfer_error<E: std::fmt::Display>(error: E) -> ConvoyError {
    ConvoyError::Transfer(error.to_string())
}

struct SshConnection {
    handle: Handle<ClientHandler>,
    reporter: HostReporter,
    sudo_password: String,
}

#[async_trait]
impl Connection for SshConnection {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), ConvoyError> {
        let contents = tokio::fs::read(local).await.map_err(|e| {
            ConvoyError::Transfer(format!("unable to read {}: {}", local.display(), e))
        })?;

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(transfer_error)?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(transfer_error)?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(transfer_error)?;

        let mut file = sftp
            .open_with_flags(
                remote,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(transfer_error)?;
        file.write_all(&contents).await.map_err(transfer_error)?;
        file.flush().await.map_err(transfer_error)?;
        file.shutdown().await.map_err(transfer_error)?;
        Ok(())
    }

    async fn run(&self, line: &str) -> Result<(), ConvoyError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(ConvoyError::Session)?;
        channel
            .request_pty(
                false,
                "tty",
                80,
                40,
                0,
                0,
                &[(Pty::TTY_OP_ISPEED, 14400), (Pty::TTY_OP_OSPEED, 14400)],
            )
            .await
            .map_err(ConvoyError::Session)?;
        channel
            .exec(true, line)
            .await
            .map_err(ConvoyError::Session)?;

        // The scanner sees every output byte as it arrives; responses are
        // written back on the same channel, so an answered prompt unblocks
        // the remote command mid-stream.
        let mut scanner = PromptScanner::new(&self.sudo_password);
        while let Some(msg) = channel.wait().await {
            let data = match msg {
                ChannelMsg::Data { data } => data,
                ChannelMsg::ExtendedData { data, .. } => data,
                _ => continue,
            };
            for action in scanner.feed(&data) {
                match action {
                    Action::Line(text) => self.reporter.line(&text),
                    Action::Respond(reply) => channel
                        .data(reply.as_bytes())
                        .await
                        .map_err(ConvoyError::Session)?,
                }
            }
        }
        if let Some(tail) = scanner.finish() {
            self.reporter.line(&tail);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await;
    }
}
