use crate::type_tag::TagLayout;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Port recommended for the adapter's OPC UA endpoint.
pub const DEFAULT_PORT: u16 = 16664;

/// Settings for [`ControlSystemAdapter`](crate::ControlSystemAdapter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind_address: IpAddr,
    /// `0` lets the OS pick a free port.
    pub port: u16,
    /// Capacity of the dispatch worker's request queue.
    pub request_queue: usize,
    pub tag_layout: TagLayout,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            request_queue: 32,
            tag_layout: TagLayout::Standard,
        }
    }
}

impl AdapterConfig {
    /// Default settings on the given port.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
