//! Wires the pieces together: staging, reaper, hub, supervisor and server.

use crate::config::BridgeConfig;
use crate::dispatch::EvalDispatcher;
use crate::engine::{EngineHandle, Supervisor, SupervisorHandle};
use crate::hub::BroadcastHub;
use crate::ipc::{BridgeServer, ServerHandle};
use crate::staging::{ArtifactReaper, StagingStore};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

/// A running bridge. Dropping it shuts everything down as well, but
/// [`Bridge::shutdown`] makes the order explicit.
pub struct Bridge {
    local_addr: SocketAddr,
    engine: EngineHandle,
    server: Option<ServerHandle>,
    supervisor: Option<SupervisorHandle>,
    reaper: Option<ArtifactReaper>,
}

impl Bridge {
    /// Start from an already validated config.
    pub fn start(config: &BridgeConfig) -> Result<Self> {
        let command = config.engine_command()?;
        let store = Arc::new(
            StagingStore::new(&config.staging_dir).context("failed to open staging directory")?,
        );
        let reaper = ArtifactReaper::start();
        let hub = BroadcastHub::new(config.client_queue_capacity);
        let engine = EngineHandle::new(hub);
        let dispatcher = EvalDispatcher::new(
            engine.clone(),
            Arc::clone(&store),
            reaper.handle(),
            config.artifact_ttl(),
        );

        let server = BridgeServer::bind(config.listen, engine.clone(), dispatcher)
            .with_context(|| format!("failed to listen on {}", config.listen))?;
        let local_addr = server.local_addr()?;

        tracing::info!(
            %local_addr,
            engine = %command.display(),
            startup_script = %command.startup_script.display(),
            staging_dir = %store.dir().display(),
            "starting bridge"
        );
        let supervisor = Supervisor::new(command, engine.clone()).start();
        let server = server.start();

        Ok(Self {
            local_addr,
            engine,
            server: Some(server),
            supervisor: Some(supervisor),
            reaper: Some(reaper),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Stop accepting clients, stop the engine, then clear staged files.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.stop();
        }
        if let Some(reaper) = self.reaper.take() {
            reaper.shutdown();
            tracing::info!("bridge stopped");
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}
