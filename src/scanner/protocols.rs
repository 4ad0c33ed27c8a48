pub mod minecraft;

use std::io;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseResponseError {
    #[error("varint is longer than 5 bytes")]
    VarIntTooLong,
    #[error("unexpected packet id {0:#04x}")]
    UnexpectedPacketId(i32),
    #[error("invalid length {0}")]
    InvalidLength(i32),
    #[error("connection closed before the response was complete")]
    Incomplete,
    #[error("response is not a json object")]
    NotJson,
}

/// Anything that can go wrong while talking to a server, before we've even
/// looked at what it sent.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseResponseError),
}
