//! Endpoint resolution and the forward-only endpoint cursor.

use std::net::SocketAddr;
use tracing::debug;

use crate::error::SessionError;

/// Ordered candidate endpoints for one server, consumed front to back
#[derive(Debug, Clone)]
pub struct EndpointList {
    endpoints: Vec<SocketAddr>,
    cursor: usize,
}

impl EndpointList {
    /// Wrap a non-empty list of endpoints
    pub fn new(endpoints: Vec<SocketAddr>) -> Result<Self, SessionError> {
        if endpoints.is_empty() {
            return Err(SessionError::NoEndpoints("endpoint list".to_string()));
        }
        Ok(Self {
            endpoints,
            cursor: 0,
        })
    }

    /// Take the endpoint under the cursor and advance past it
    pub fn advance(&mut self) -> Option<SocketAddr> {
        let endpoint = self.endpoints.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(endpoint)
    }

    /// Whether at least one endpoint has not been handed out yet
    pub fn has_remaining(&self) -> bool {
        self.cursor < self.endpoints.len()
    }

    /// Number of endpoints handed out so far
    pub fn attempted(&self) -> usize {
        self.cursor
    }

    /// Total number of candidate endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; an empty list cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Resolve `host:port` into the ordered candidate list
pub async fn resolve(host: &str, port: u16) -> Result<EndpointList, SessionError> {
    let endpoints: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| SessionError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .collect();

    debug!(
        component = "resolver",
        "Resolved {}:{} to {} endpoint(s): {:?}",
        host,
        port,
        endpoints.len(),
        endpoints
    );

    if endpoints.is_empty() {
        return Err(SessionError::NoEndpoints(format!("{}:{}", host, port)));
    }
    EndpointList::new(endpoints)
}
