use std::net::SocketAddr;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("frame error: {0}")]
    FrameError(String),

    #[error("dialog error: {0}: call {1}")]
    DialogError(String, u16),

    #[error("peer error: {0}")]
    PeerError(String),

    #[error("transport error: {0}: {1}")]
    TransportError(String, SocketAddr),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("address parse error: {0}")]
    AddrParseError(#[from] std::net::AddrParseError),

    #[error("channel send error: {0}")]
    ChannelSendError(String),

    #[error("error: {0}")]
    Error(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelSendError(e.to_string())
    }
}
