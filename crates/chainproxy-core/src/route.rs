//! Call-site-based routing: which endpoints may serve a call, in what order.

use serde::{Deserialize, Serialize};

use crate::endpoint::{EndpointId, EndpointRegistry};

/// Methods that must stay on the public endpoints: wallet interaction and
/// lookups of transactions those endpoints broadcast.
pub const WALLET_METHODS: &[&str] = &[
    "eth_sendTransaction",
    "eth_sendRawTransaction",
    "eth_sign",
    "eth_signTransaction",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v4",
    "wallet_switchEthereumChain",
    "wallet_addEthereumChain",
    "eth_getTransactionReceipt",
    "eth_getTransactionByHash",
    "eth_estimateGas",
    "eth_gasPrice",
];

/// Returns `true` if `method` must never reach the private endpoint.
pub fn is_wallet_method(method: &str) -> bool {
    WALLET_METHODS.contains(&method)
}

/// Traffic class selected by the caller with `?type=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    /// Bulk/global reads; prefer the private endpoint, tolerate staleness.
    Market,
    /// Interactive reads; public endpoints only, freshness first.
    #[default]
    User,
}

impl TrafficClass {
    /// Parse the `type` query value. Anything but exactly `market` is
    /// user traffic.
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("market") => Self::Market,
            _ => Self::User,
        }
    }
}

impl std::fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::User => write!(f, "user"),
        }
    }
}

/// Pure mapping from (method, traffic class) to an ordered candidate list.
#[derive(Debug, Clone)]
pub struct RouteSelector {
    private: EndpointId,
    public: Vec<EndpointId>,
}

impl RouteSelector {
    pub fn new(registry: &EndpointRegistry) -> Self {
        Self {
            private: registry.private(),
            public: registry.public().collect(),
        }
    }

    /// Candidate endpoints for `method` under `class`, most preferred first.
    pub fn select(&self, method: &str, class: TrafficClass) -> Vec<EndpointId> {
        if is_wallet_method(method) {
            return self.public.clone();
        }
        match class {
            TrafficClass::Market => {
                let mut ids = Vec::with_capacity(self.public.len() + 1);
                ids.push(self.private);
                ids.extend_from_slice(&self.public);
                ids
            }
            TrafficClass::User => self.public.clone(),
        }
    }
}
