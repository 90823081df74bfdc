//! The protocol server: endpoint, address space and dispatch worker.
//!
//! Client requests reach the address space through a single dispatch
//! thread fed by a bounded channel; each request carries a oneshot reply.
//! The thread does not serve anything until the request gate is opened,
//! which the adapter does once the initial mapping pass has finished.
//!
//! Halting signals the thread directly instead of waiting for every
//! outstanding sender to go away: the worker then closes its queue, serves
//! what is already queued and exits. Callers still waiting for queue space
//! get [`AdapterError::Internal`].

use crate::address_space::{AddressSpace, FieldId, MemoryAddressSpace, NodeId, NodeSnapshot, ids};
use crate::config::AdapterConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::worker::ManagedWorker;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

pub enum ServerRequest {
    Browse {
        node: NodeId,
        reply: oneshot::Sender<AdapterResult<Vec<NodeSnapshot>>>,
    },
    Describe {
        node: NodeId,
        reply: oneshot::Sender<AdapterResult<NodeSnapshot>>,
    },
    Read {
        node: NodeId,
        field: FieldId,
        reply: oneshot::Sender<AdapterResult<String>>,
    },
    Write {
        node: NodeId,
        field: FieldId,
        value: String,
        reply: oneshot::Sender<AdapterResult<()>>,
    },
}

#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = self
                .cond
                .wait(open)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Default)]
struct Shared {
    sender: Mutex<Option<mpsc::Sender<ServerRequest>>>,
    gate: Gate,
}

/// Cloneable client-side handle to a [`UaServer`]'s dispatch worker.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Queue a request and wait for its reply.
    ///
    /// # Errors
    /// Returns [`AdapterError::InvalidState`] while the server is stopped,
    /// [`AdapterError::Internal`] if the worker goes away mid-request, or
    /// the error produced by the request itself.
    pub async fn send_request<F, R>(&self, req_builder: F) -> AdapterResult<R>
    where
        F: FnOnce(oneshot::Sender<AdapterResult<R>>) -> ServerRequest,
    {
        let sender = {
            let guard = self
                .shared
                .sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        }
        .ok_or_else(|| AdapterError::InvalidState("OPC UA server is not running".into()))?;

        let (tx, rx) = oneshot::channel();
        sender
            .send(req_builder(tx))
            .await
            .map_err(|_| AdapterError::Internal("Server channel closed (worker stopped)".into()))?;
        drop(sender);

        rx.await
            .map_err(|_| AdapterError::Internal("Server shut down during request".into()))?
    }

    /// # Errors
    /// See [`send_request`](Self::send_request).
    pub async fn browse(&self, node: NodeId) -> AdapterResult<Vec<NodeSnapshot>> {
        self.send_request(|reply| ServerRequest::Browse { node, reply })
            .await
    }

    /// # Errors
    /// See [`send_request`](Self::send_request).
    pub async fn describe(&self, node: NodeId) -> AdapterResult<NodeSnapshot> {
        self.send_request(|reply| ServerRequest::Describe { node, reply })
            .await
    }

    /// # Errors
    /// See [`send_request`](Self::send_request).
    pub async fn read(&self, node: NodeId, field: FieldId) -> AdapterResult<String> {
        self.send_request(|reply| ServerRequest::Read { node, field, reply })
            .await
    }

    /// # Errors
    /// See [`send_request`](Self::send_request).
    pub async fn write(
        &self,
        node: NodeId,
        field: FieldId,
        value: impl Into<String>,
    ) -> AdapterResult<()> {
        let value = value.into();
        self.send_request(|reply| ServerRequest::Write {
            node,
            field,
            value,
            reply,
        })
        .await
    }

    /// Look up a mapped variable's node by display name.
    ///
    /// # Errors
    /// See [`send_request`](Self::send_request).
    pub async fn find_variable(&self, name: &str) -> AdapterResult<Option<NodeSnapshot>> {
        let nodes = self.browse(ids::PROCESS_VARIABLES).await?;
        Ok(nodes.into_iter().find(|n| n.display_name.text == name))
    }

    /// Let the dispatch worker start serving queued requests.
    pub fn open_gate(&self) {
        self.shared.gate.open();
    }
}

/// OPC UA server owning the endpoint socket and the address space.
///
/// Network transport is left to the protocol stack; the server keeps the
/// bound listener so the port stays reserved for it.
pub struct UaServer {
    _listener: TcpListener,
    local_addr: SocketAddr,
    request_queue: usize,
    space: Arc<MemoryAddressSpace>,
    shared: Arc<Shared>,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl UaServer {
    /// Bind the endpoint and set up an empty address space.
    ///
    /// # Errors
    /// Returns [`AdapterError::Bind`] if the address cannot be bound.
    pub fn new(config: &AdapterConfig) -> AdapterResult<Self> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr).map_err(|source| AdapterError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AdapterError::Bind { addr, source })?;
        tracing::info!(endpoint = %local_addr, "OPC UA endpoint bound");

        Ok(Self {
            _listener: listener,
            local_addr,
            request_queue: config.request_queue.max(1),
            space: Arc::new(MemoryAddressSpace::new()),
            shared: Arc::new(Shared::default()),
            stop: None,
            thread: None,
        })
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn address_space(&self) -> Arc<dyn AddressSpace> {
        self.space.clone()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn dispatch(space: &dyn AddressSpace, request: ServerRequest) {
        match request {
            ServerRequest::Browse { node, reply } => {
                let span = tracing::debug_span!("opcua.browse", node = %node);
                let _enter = span.enter();
                let _ = reply.send(space.browse(&node));
            }
            ServerRequest::Describe { node, reply } => {
                let _ = reply.send(space.describe(&node));
            }
            ServerRequest::Read { node, field, reply } => {
                let span = tracing::debug_span!("opcua.read", node = %node, field = %field);
                let _enter = span.enter();
                let result = space.read_field(&node, field);
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "read rejected");
                }
                let _ = reply.send(result);
            }
            ServerRequest::Write {
                node,
                field,
                value,
                reply,
            } => {
                let span = tracing::debug_span!("opcua.write", node = %node, field = %field);
                let _enter = span.enter();
                let result = space.write_field(&node, field, value);
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "write rejected");
                }
                let _ = reply.send(result);
            }
        }
    }
}

impl ManagedWorker for UaServer {
    fn name(&self) -> &str {
        "opcua-server"
    }

    fn launch(&mut self) -> AdapterResult<()> {
        let (tx, mut rx) = mpsc::channel(self.request_queue);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let space = Arc::clone(&self.space);
        let shared = Arc::clone(&self.shared);

        let thread = std::thread::Builder::new()
            .name("opcua-dispatch".into())
            .spawn(move || {
                shared.gate.wait();
                let runtime = match tokio::runtime::Builder::new_current_thread().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to build dispatch runtime");
                        return;
                    }
                };
                tracing::debug!("dispatch worker serving");
                runtime.block_on(async {
                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut stop_rx => break,
                            request = rx.recv() => match request {
                                Some(request) => Self::dispatch(space.as_ref(), request),
                                None => break,
                            },
                        }
                    }
                });

                rx.close();
                let mut drained = 0usize;
                while let Ok(request) = rx.try_recv() {
                    Self::dispatch(space.as_ref(), request);
                    drained += 1;
                }
                tracing::debug!(drained, "dispatch worker exiting cleanly");
            })
            .map_err(|e| AdapterError::Internal(format!("failed to spawn dispatch worker: {e}")))?;

        *self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        self.stop = Some(stop_tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn halt(&mut self) {
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop) = self.stop.take() {
            // Err means the worker already exited.
            let _ = stop.send(());
        }
        self.shared.gate.open();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("dispatch worker panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{LocalizedText, ObjectNodeRequest};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn local_config() -> AdapterConfig {
        AdapterConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..AdapterConfig::default()
        }
    }

    #[test]
    fn test_bind_conflict_is_reported() {
        let first = UaServer::new(&local_config()).unwrap();
        let taken = AdapterConfig {
            port: first.local_addr().port(),
            ..local_config()
        };
        let err = UaServer::new(&taken).err().unwrap();
        assert!(matches!(err, AdapterError::Bind { addr, .. } if addr == taken.socket_addr()));
    }

    #[tokio::test]
    async fn test_requests_fail_while_not_running() {
        let server = UaServer::new(&local_config()).unwrap();
        let handle = server.handle();
        let err = handle.browse(ids::OBJECTS_FOLDER).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_gate_holds_requests_until_opened() {
        let mut server = UaServer::new(&local_config()).unwrap();
        let handle = server.handle();
        server.launch().unwrap();
        assert!(server.is_running());

        let pending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.browse(ids::OBJECTS_FOLDER).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        handle.open_gate();
        let children = pending.await.unwrap().unwrap();
        assert_eq!(children[0].id, ids::PROCESS_VARIABLES);

        server.halt();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_read_write_dispatch() {
        let mut server = UaServer::new(&local_config()).unwrap();
        let space = server.address_space();
        let node = space
            .add_object_node(ObjectNodeRequest {
                parent: ids::PROCESS_VARIABLES,
                reference_type: ids::HAS_COMPONENT,
                browse_name: "Temp1".into(),
                display_name: LocalizedText::en("Temp1"),
                description: LocalizedText::en("A process scalar"),
                type_definition: ids::PROCESS_SCALAR_TYPE,
            })
            .unwrap();
        let handle = server.handle();
        handle.open_gate();
        server.launch().unwrap();

        let found = handle.find_variable("Temp1").await.unwrap().unwrap();
        assert_eq!(found.id, node);
        assert!(handle.find_variable("Other").await.unwrap().is_none());

        let err = handle.read(node, FieldId::Value).await.unwrap_err();
        assert!(matches!(err, AdapterError::NoDataSource { .. }));
        let err = handle
            .write(NodeId::numeric(1, 1), FieldId::Value, "1")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NodeNotFound(_)));

        let described = handle.describe(node).await.unwrap();
        assert_eq!(described.browse_name, "Temp1");

        server.halt();
    }

    #[tokio::test]
    async fn test_halt_with_full_queue_returns() {
        let config = AdapterConfig {
            request_queue: 1,
            ..local_config()
        };
        let mut server = UaServer::new(&config).unwrap();
        let handle = server.handle();
        server.launch().unwrap();

        // gate closed: the first request fills the queue, the others wait
        // for space while holding a sender
        let pending: Vec<_> = (0..3)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.browse(ids::OBJECTS_FOLDER).await })
            })
            .collect();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(pending.iter().all(|task| !task.is_finished()));

        server.halt();
        assert!(!server.is_running());

        let mut served = 0;
        for task in pending {
            match task.await.unwrap() {
                Ok(children) => {
                    assert_eq!(children[0].id, ids::PROCESS_VARIABLES);
                    served += 1;
                }
                Err(e) => assert!(matches!(e, AdapterError::Internal(_)), "{e}"),
            }
        }
        assert_eq!(served, 1);
    }

    #[tokio::test]
    async fn test_halt_then_relaunch() {
        let mut server = UaServer::new(&local_config()).unwrap();
        let handle = server.handle();
        handle.open_gate();

        server.launch().unwrap();
        server.halt();
        assert!(matches!(
            handle.browse(ids::OBJECTS_FOLDER).await,
            Err(AdapterError::InvalidState(_))
        ));

        server.launch().unwrap();
        assert!(handle.browse(ids::OBJECTS_FOLDER).await.is_ok());
        server.halt();
    }
}
