use skirmish_core::net::messages::ProtocolError;

use crate::connection::ConnectionId;

#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
    Protocol(ProtocolError),
    /// The connection's send gate was torn down mid-send.
    ConnectionClosed(ConnectionId),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::ConnectionClosed(id) => write!(f, "connection {id} closed"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::ConnectionClosed(_) => None,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for ServerError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
