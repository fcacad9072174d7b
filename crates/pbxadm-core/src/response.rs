//! JSON response envelope for the administrative surface

use serde::Serialize;

use crate::error::AdminError;

/// `{success, message, data?, warnings?, code?}`
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Error code, on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    /// HTTP-style status, on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            warnings: Vec::new(),
            code: None,
            status: None,
        }
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

impl Envelope<()> {
    #[must_use]
    pub fn error(err: &AdminError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            data: None,
            warnings: Vec::new(),
            code: Some(err.code()),
            status: Some(err.http_status()),
        }
    }
}
