//! Server start-up errors.

use thiserror::Error;

use chainproxy_core::ProxyError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
