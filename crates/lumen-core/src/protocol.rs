//! Control-plane request and reply packets exchanged with devices

use serde::{Deserialize, Serialize};

/// Body of `POST /login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub mac: String,
    pub checksum: String,
}

/// Body of `POST /register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub mac: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginOutcome {
    Success,
    /// No checksum on file for the MAC
    NotRegistered,
    WrongChecksum,
    /// Checksum accepted but the session could not start
    InternalError,
}

impl LoginOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegisterOutcome {
    Success,
    AlreadyRegistered,
}

impl RegisterOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Reply body shared by `/login` and `/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply<C> {
    pub message: String,
    pub code: C,
}

impl ControlReply<LoginOutcome> {
    pub fn login(code: LoginOutcome) -> Self {
        Self {
            message: status_message(code.is_success()).to_string(),
            code,
        }
    }
}

impl ControlReply<RegisterOutcome> {
    pub fn register(code: RegisterOutcome) -> Self {
        Self {
            message: status_message(code.is_success()).to_string(),
            code,
        }
    }
}

fn status_message(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failed"
    }
}
