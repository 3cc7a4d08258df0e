//! SSH port-forward supervisor for reaching a database behind a bastion.
//!
//! `start` is idempotent: a local port that already accepts connections is
//! treated as someone else's tunnel and reused without being owned. Otherwise
//! a single `ssh -N -L` child is spawned and awaited until the port opens.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};

use lexfind_core::config::{expand_path, TunnelSettings};
use lexfind_core::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.host, self.port) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelOwnership {
    NotStarted,
    Reused,
    Owned,
}

enum TunnelState {
    Idle,
    Reused,
    Owned(Child),
}

pub struct TunnelSupervisor {
    settings: TunnelSettings,
    state: Mutex<TunnelState>,
}

impl TunnelSupervisor {
    pub fn new(settings: TunnelSettings) -> Self { Self { settings, state: Mutex::new(TunnelState::Idle) } }

    /// The address the connection pool must dial.
    pub fn local_endpoint(&self) -> Endpoint { Endpoint { host: "127.0.0.1".to_string(), port: self.settings.local_port } }

    pub async fn ownership(&self) -> TunnelOwnership {
        match &*self.state.lock().await {
            TunnelState::Idle => TunnelOwnership::NotStarted,
            TunnelState::Reused => TunnelOwnership::Reused,
            TunnelState::Owned(_) => TunnelOwnership::Owned,
        }
    }

    async fn port_open(&self) -> bool {
        matches!(timeout(PROBE_TIMEOUT, TcpStream::connect(("127.0.0.1", self.settings.local_port))).await, Ok(Ok(_)))
    }

    pub async fn start(&self) -> Result<Endpoint> {
        let mut state = self.state.lock().await;
        if let TunnelState::Owned(child) = &mut *state {
            match child.try_wait() {
                Ok(None) => return Ok(self.local_endpoint()),
                Ok(Some(status)) => tracing::warn!(%status, "ssh forwarder exited; restarting"),
                Err(e) => tracing::warn!(error = %e, "ssh forwarder state unknown; restarting"),
            }
            *state = TunnelState::Idle;
        }
        if self.port_open().await {
            if !matches!(*state, TunnelState::Reused) {
                tracing::info!(endpoint = %self.local_endpoint(), "local port already open; reusing existing tunnel");
            }
            *state = TunnelState::Reused;
            return Ok(self.local_endpoint());
        }
        let child = self.spawn_and_wait().await?;
        *state = TunnelState::Owned(child);
        Ok(self.local_endpoint())
    }

    fn command(&self) -> Result<Command> {
        let s = &self.settings;
        if s.bastion_host.trim().is_empty() || s.remote_host.trim().is_empty() {
            return Err(Error::Tunnel("bastion_host and remote_host must be set".to_string()));
        }
        let key = expand_path(&s.key_path);
        let mut cmd = Command::new(&s.ssh_binary);
        cmd.arg("-N")
            .args(["-o", "ExitOnForwardFailure=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-L")
            .arg(format!("127.0.0.1:{}:{}:{}", s.local_port, s.remote_host, s.remote_port))
            .arg("-i")
            .arg(key)
            .arg("-p")
            .arg(s.bastion_port.to_string())
            .arg(format!("{}@{}", s.user, s.bastion_host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        Ok(cmd)
    }

    async fn spawn_and_wait(&self) -> Result<Child> {
        let mut cmd = self.command()?;
        tracing::info!(bastion = %self.settings.bastion_host, local_port = self.settings.local_port, "starting ssh tunnel");
        let mut child = cmd.spawn().map_err(|e| Error::Tunnel(format!("failed to spawn {}: {e}", self.settings.ssh_binary)))?;
        let deadline = Instant::now() + Duration::from_millis(self.settings.ready_timeout_ms);
        loop {
            if self.port_open().await {
                tracing::info!(endpoint = %self.local_endpoint(), "ssh tunnel ready");
                return Ok(child);
            }
            if let Ok(Some(status)) = child.try_wait() {
                return Err(Error::Tunnel(format!("ssh exited before the tunnel opened: {status}")));
            }
            if Instant::now() >= deadline {
                let _ = child.kill().await;
                return Err(Error::Tunnel(format!("tunnel not ready after {}ms", self.settings.ready_timeout_ms)));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Terminate the forwarder if this supervisor spawned it. A reused
    /// tunnel is left running.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, TunnelState::Idle) {
            TunnelState::Owned(mut child) => {
                child.kill().await.map_err(|e| Error::Tunnel(format!("failed to stop ssh: {e}")))?;
                tracing::info!("ssh tunnel stopped");
            }
            TunnelState::Reused => tracing::debug!("leaving reused tunnel running"),
            TunnelState::Idle => {}
        }
        Ok(())
    }

    /// Whether the local endpoint currently accepts connections.
    pub async fn health_check(&self) -> bool {
        let healthy = self.port_open().await;
        if !healthy { tracing::warn!(endpoint = %self.local_endpoint(), "tunnel endpoint not reachable"); }
        healthy
    }
}
