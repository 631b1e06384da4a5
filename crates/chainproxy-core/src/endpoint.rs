//! Upstream endpoint registry.
//!
//! Endpoints are registered once, private endpoint first, then the public
//! endpoints in configured order. Everything else in the proxy refers to
//! an endpoint by its [`EndpointId`], i.e. its registry position, so the
//! same URL configured twice still gets two independent health records.

use serde::Serialize;

use crate::error::ProxyError;

/// Position of an endpoint in the [`EndpointRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EndpointId(usize);

impl EndpointId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which subset an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    /// High-throughput endpoint reserved for market traffic.
    Private,
    /// Generic endpoint usable by every traffic class.
    Public,
}

/// One upstream JSON-RPC server.
#[derive(Debug, Clone, Serialize)]
pub struct Endpoint {
    pub url: String,
    pub role: EndpointRole,
}

/// Ordered, immutable list of upstream endpoints.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistry {
    /// Registers `private_url` at position 0 followed by `public_urls`.
    ///
    /// At least one public endpoint is required: wallet and user traffic
    /// never reaches the private endpoint.
    pub fn new(
        private_url: impl Into<String>,
        public_urls: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ProxyError> {
        let mut endpoints = vec![Endpoint {
            url: private_url.into(),
            role: EndpointRole::Private,
        }];
        endpoints.extend(public_urls.into_iter().map(|url| Endpoint {
            url: url.into(),
            role: EndpointRole::Public,
        }));

        if endpoints.len() < 2 {
            return Err(ProxyError::Config(
                "at least one public endpoint is required".into(),
            ));
        }
        if let Some(empty) = endpoints.iter().position(|e| e.url.trim().is_empty()) {
            return Err(ProxyError::Config(format!(
                "endpoint #{empty} has an empty URL"
            )));
        }
        Ok(Self { endpoints })
    }

    /// Number of registered endpoints (private included).
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always `false`: a registry holds at least two endpoints.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, id: EndpointId) -> &Endpoint {
        &self.endpoints[id.0]
    }

    /// The private, high-throughput endpoint.
    pub fn private(&self) -> EndpointId {
        EndpointId(0)
    }

    /// Public endpoints in registration order.
    pub fn public(&self) -> impl Iterator<Item = EndpointId> + '_ {
        (1..self.endpoints.len()).map(EndpointId)
    }

    /// All endpoints with their ids, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (EndpointId, &Endpoint)> {
        self.endpoints
            .iter()
            .enumerate()
            .map(|(i, e)| (EndpointId(i), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_first_then_public() {
        let reg = EndpointRegistry::new(
            "https://private.example",
            ["https://a.example", "https://b.example"],
        )
        .unwrap();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.get(reg.private()).role, EndpointRole::Private);
        let public: Vec<_> = reg.public().map(|id| reg.get(id).url.clone()).collect();
        assert_eq!(public, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn same_url_gets_distinct_ids() {
        let reg = EndpointRegistry::new("https://rpc.example", ["https://rpc.example"]).unwrap();
        let public: Vec<_> = reg.public().collect();
        assert_ne!(reg.private(), public[0]);
    }

    #[test]
    fn rejects_missing_public_endpoints() {
        let err = EndpointRegistry::new("https://private.example", Vec::<String>::new())
            .unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }

    #[test]
    fn rejects_empty_url() {
        assert!(EndpointRegistry::new("https://private.example", ["  "]).is_err());
    }
}
