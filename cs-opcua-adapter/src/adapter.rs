use crate::address_space::{AddressSpace, ids};
use crate::config::AdapterConfig;
use crate::errors::AdapterResult;
use crate::mapping::{MappingReport, SkippedVariable, map_all};
use crate::process::ProcessVariableSource;
use crate::server::{ServerHandle, UaServer};
use crate::variable::MappedVariable;
use crate::worker::WorkerManager;
use std::net::SocketAddr;
use std::sync::Arc;

/// Bridges a process-variable source to an OPC UA server.
///
/// Construction binds the endpoint, starts the server worker, maps every
/// source variable once, and then lets the worker serve requests. The
/// adapter owns the mapped variables; dropping it halts the worker and
/// removes their nodes.
pub struct ControlSystemAdapter {
    // Field order is drop order: halt the worker before nodes go away.
    manager: WorkerManager,
    report: MappingReport,
    server: ServerHandle,
    space: Arc<dyn AddressSpace>,
    source: Arc<dyn ProcessVariableSource>,
    local_addr: SocketAddr,
    config: AdapterConfig,
}

impl ControlSystemAdapter {
    /// # Errors
    /// Returns `Err` if the endpoint cannot be bound or the server worker
    /// cannot be started. Per-variable mapping failures are not errors;
    /// see [`skipped`](Self::skipped).
    pub fn new(
        config: AdapterConfig,
        source: Arc<dyn ProcessVariableSource>,
    ) -> AdapterResult<Self> {
        let server = UaServer::new(&config)?;
        let handle = server.handle();
        let space = server.address_space();
        let local_addr = server.local_addr();

        let mut manager = WorkerManager::new();
        manager.add_object(Box::new(server))?;
        manager.start_all()?;
        tracing::info!(endpoint = %local_addr, "Server active...");

        let report = map_all(
            source.as_ref(),
            &space,
            ids::PROCESS_VARIABLES,
            config.tag_layout,
        );
        handle.open_gate();

        Ok(Self {
            manager,
            report,
            server: handle,
            space,
            source,
            local_addr,
            config,
        })
    }

    /// Start the server worker if it is not running.
    ///
    /// # Errors
    /// Returns `Err` after [`terminate`](Self::terminate).
    pub fn start(&mut self) -> AdapterResult<()> {
        self.manager.start_all()
    }

    /// Stop the server worker; a later `start` resumes serving.
    pub fn stop(&mut self) {
        self.manager.stop_all();
    }

    /// Stop the server worker for good.
    pub fn terminate(&mut self) {
        self.manager.terminate();
    }

    pub fn is_running(&self) -> bool {
        self.manager.is_running()
    }

    /// Number of times a server worker thread has been launched.
    pub const fn worker_launches(&self) -> usize {
        self.manager.launches()
    }

    pub fn handle(&self) -> ServerHandle {
        self.server.clone()
    }

    pub const fn address_space(&self) -> &Arc<dyn AddressSpace> {
        &self.space
    }

    /// The variable source the adapter was built from.
    pub const fn source(&self) -> &Arc<dyn ProcessVariableSource> {
        &self.source
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub const fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn mapped_variables(&self) -> &[MappedVariable] {
        &self.report.mapped
    }

    pub fn variable(&self, name: &str) -> Option<&MappedVariable> {
        self.report.find(name)
    }

    pub fn skipped(&self) -> &[SkippedVariable] {
        &self.report.skipped
    }
}
