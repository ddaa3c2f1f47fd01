use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImapError {
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error("login rejected: {0}")]
    AuthRejected(String),
    #[error("{command} failed: {info}")]
    CommandFailed { command: String, info: String },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ImapError {
    pub(crate) fn io(source: std::io::Error) -> Self {
        Self::Io { source }
    }

    pub(crate) fn tls(source: native_tls::Error) -> Self {
        Self::Tls { source }
    }
}
