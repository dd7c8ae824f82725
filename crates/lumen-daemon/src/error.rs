//! Errors raised while talking to devices and managing sessions

use lumen_core::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommunicationError {
    /// The device is not logged in
    #[error("communication unavailable: device {0} is not logged in")]
    Unavailable(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("device answered with status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(#[from] ProtocolError),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("device {0} has no lights to control")]
    NoLights(String),
    #[error("no light with index {0}")]
    UnknownLight(usize),
    #[error(transparent)]
    Communication(#[from] CommunicationError),
}
