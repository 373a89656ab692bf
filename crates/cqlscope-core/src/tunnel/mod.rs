//! SSH tunnels to clusters that are only reachable through a hop host.
//!
//! A [`Tunnel`] owns one authenticated SSH connection. [`Tunnel::forward`]
//! binds a loopback listener and relays every accepted connection through a
//! `direct-tcpip` channel, so the database driver can connect to
//! `127.0.0.1:<local_port>` as if the cluster were local.

mod detect;

pub use detect::{LISTENERS_COMMAND, detect_listen_address};

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_SSH_PORT, DEFAULT_SSH_USER};

/// Errors raised while setting up or using the SSH hop.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// TCP connect or SSH handshake failed.
    #[error("Failed to connect to {0}")]
    Connect(String),

    /// The hop host refused the credentials.
    #[error("Authentication failed for {0}")]
    Authentication(String),

    /// Opening or driving a channel failed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Local listener errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The SSH hop used to reach the database network.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteHop {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl RemoteHop {
    /// Hop on the default SSH port as the default user.
    pub fn new(host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: DEFAULT_SSH_USER.to_string(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@host:port`, for messages.
    pub fn display_target(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

impl std::fmt::Debug for RemoteHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHop")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Output of a command run on the hop host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<u32>,
}

struct HopHandler {
    host: String,
}

#[async_trait]
impl client::Handler for HopHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "Accepting unverified host key"
        );
        Ok(true)
    }
}

/// An authenticated SSH connection, optionally forwarding a local port.
pub struct Tunnel {
    hop: RemoteHop,
    handle: Arc<Handle<HopHandler>>,
    forwarder: Option<JoinHandle<()>>,
    local_port: Option<u16>,
    stopped: bool,
}

impl Tunnel {
    /// Connects and authenticates to the hop host with a password.
    pub async fn connect(hop: &RemoteHop, keepalive: Duration) -> Result<Self, TunnelError> {
        info!(target_host = %hop.display_target(), "Create ssh tunnel");

        let config = Arc::new(client::Config {
            keepalive_interval: Some(keepalive),
            ..Default::default()
        });
        let handler = HopHandler { host: hop.host.clone() };

        let mut handle = client::connect(config, (hop.host.as_str(), hop.port), handler)
            .await
            .map_err(|e| TunnelError::Connect(format!("{}: {}", hop.display_target(), e)))?;

        let authenticated = handle
            .authenticate_password(hop.user.clone(), hop.password.clone())
            .await
            .map_err(|e| TunnelError::Connect(format!("{}: {}", hop.display_target(), e)))?;
        if !authenticated {
            return Err(TunnelError::Authentication(hop.display_target()));
        }

        Ok(Self {
            hop: hop.clone(),
            handle: Arc::new(handle),
            forwarder: None,
            local_port: None,
            stopped: false,
        })
    }

    /// Starts forwarding `127.0.0.1:<ephemeral>` to `service_host:service_port`
    /// as seen from the hop host. Returns the local port.
    ///
    /// Calling it again while a forward is active returns the existing port.
    pub async fn forward(
        &mut self,
        service_host: &str,
        service_port: u16,
    ) -> Result<u16, TunnelError> {
        if let Some(port) = self.local_port {
            return Ok(port);
        }

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let local_port = listener.local_addr()?.port();
        let handle = Arc::clone(&self.handle);
        let target_host = service_host.to_string();

        info!(
            hop = %self.hop.host,
            bind = %format!("{service_host}:{service_port}"),
            local_port,
            "Forwarding local port"
        );

        let task = tokio::spawn(async move {
            loop {
                let (mut socket, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Tunnel listener stopped");
                        break;
                    }
                };
                let handle = Arc::clone(&handle);
                let host = target_host.clone();
                tokio::spawn(async move {
                    let channel = match handle
                        .channel_open_direct_tcpip(
                            host.clone(),
                            u32::from(service_port),
                            peer.ip().to_string(),
                            u32::from(peer.port()),
                        )
                        .await
                    {
                        Ok(channel) => channel,
                        Err(e) => {
                            warn!(
                                target_host = %host,
                                error = %e,
                                "Failed to open forwarding channel"
                            );
                            return;
                        }
                    };
                    let mut stream = channel.into_stream();
                    match tokio::io::copy_bidirectional(&mut socket, &mut stream).await {
                        Ok((sent, received)) => {
                            debug!(sent, received, "Forwarded connection closed")
                        }
                        Err(e) => debug!(error = %e, "Forwarded connection aborted"),
                    }
                });
            }
        });

        self.forwarder = Some(task);
        self.local_port = Some(local_port);
        Ok(local_port)
    }

    /// Runs a command on the hop host and collects its output.
    pub async fn exec(&self, command: &str) -> Result<RemoteOutput, TunnelError> {
        debug!(hop = %self.hop.host, command, "Running remote command");
        let channel_error = |e: russh::Error| TunnelError::Channel(e.to_string());

        let mut channel = self.handle.channel_open_session().await.map_err(channel_error)?;
        channel.exec(true, command).await.map_err(channel_error)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                _ => {}
            }
        }

        Ok(RemoteOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }

    /// Local port of the active forward, if any.
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    /// Stops forwarding and disconnects. Safe to call more than once.
    pub async fn stop(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        self.local_port = None;
        if !self.stopped {
            self.stopped = true;
            info!(target_host = %self.hop.display_target(), "Close ssh tunnel");
            if let Err(e) = self.handle.disconnect(Disconnect::ByApplication, "", "English").await {
                debug!(error = %e, "Disconnect failed");
            }
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_hop_defaults() {
        let hop = RemoteHop::new("10.0.0.1", "secret");
        assert_eq!(hop.port, 22);
        assert_eq!(hop.user, "root");
        assert_eq!(hop.display_target(), "root@10.0.0.1:22");

        let hop = hop.with_user("ops").with_port(2222);
        assert_eq!(hop.display_target(), "ops@10.0.0.1:2222");
    }

    #[test]
    fn test_remote_hop_debug_hides_password() {
        let hop = RemoteHop::new("10.0.0.1", "secret");
        let debug = format!("{:?}", hop);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind and drop a listener to find a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let hop = RemoteHop::new("127.0.0.1", "secret").with_port(port);
        let result = Tunnel::connect(&hop, Duration::from_millis(500)).await;
        assert!(matches!(result, Err(TunnelError::Connect(_))));
    }
}
