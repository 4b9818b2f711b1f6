use tokio_util::codec::LinesCodecError;

use crate::wire::DecodeError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reading position fixes: {0}")]
    Lines(#[from] LinesCodecError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The configured base url cannot carry path segments (e.g. `mailto:`).
    #[error("cannot build endpoint from base url {0}")]
    BadEndpoint(String),

    #[error("session has no bearer token")]
    MissingToken,

    #[error("position source unavailable: {0}")]
    SourceUnavailable(String),
}
