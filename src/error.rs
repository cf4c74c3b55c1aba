//! Error taxonomy for the ENIP/CIP stack.
//!
//! Five kinds, matching the failure taxonomy of the protocol itself rather
//! than Rust's call-stack shape: frame-level parsing failures, CIP
//! service-level rejections, routing failures, transport I/O failures, and
//! configuration-load failures. Each carries the context needed to both log
//! a useful `tracing` event and translate itself into the matching wire
//! status when a server-side handler is turning a local error into a reply.

use thiserror::Error;

/// The general CIP status byte that occupies the "general status" field of
/// a CIP response (CIP Vol 1, Appendix B).
pub type CipStatus = u8;

pub const STATUS_SUCCESS: CipStatus = 0x00;
pub const STATUS_CONNECTION_FAILURE: CipStatus = 0x01;
pub const STATUS_RESOURCE_UNAVAILABLE: CipStatus = 0x02;
pub const STATUS_INVALID_PARAMETER_VALUE: CipStatus = 0x03;
pub const STATUS_PATH_SEGMENT_ERROR: CipStatus = 0x04;
pub const STATUS_PATH_DESTINATION_UNKNOWN: CipStatus = 0x05;
pub const STATUS_PARTIAL_TRANSFER: CipStatus = 0x06;
pub const STATUS_SERVICE_NOT_SUPPORTED: CipStatus = 0x08;
pub const STATUS_INVALID_ATTRIBUTE_VALUE: CipStatus = 0x09;
pub const STATUS_ATTRIBUTE_LIST_ERROR: CipStatus = 0x0A;
pub const STATUS_NOT_ENOUGH_DATA: CipStatus = 0x13;
pub const STATUS_ATTRIBUTE_NOT_SETTABLE: CipStatus = 0x0F;
pub const STATUS_TOO_MUCH_DATA: CipStatus = 0x15;
pub const STATUS_OBJECT_DOES_NOT_EXIST: CipStatus = 0x16;

#[derive(Debug, Error)]
pub enum CipError {
    /// Truncated or malformed encapsulation/CPF/EPATH bytes. Fatal to the
    /// session: the caller must tear the connection down after reporting it.
    #[error("frame error at offset {offset}: {message}")]
    Frame { offset: usize, message: String },

    /// A syntactically valid request that the device legitimately rejects.
    /// Never fatal; surfaced as a per-operation status.
    #[error("service error: status 0x{status:02X} ({message})")]
    Service {
        status: CipStatus,
        message: String,
        extended: Option<u16>,
    },

    /// No matching `Route` entry, or a downstream routed request failed.
    #[error("routing error: {message}")]
    Routing { message: String },

    /// Socket disconnect, timeout, or connection refused.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure to parse the `.ini`-style configuration document.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A blocking operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
}

impl CipError {
    pub fn frame(offset: usize, message: impl Into<String>) -> Self {
        CipError::Frame {
            offset,
            message: message.into(),
        }
    }

    pub fn service(status: CipStatus, message: impl Into<String>) -> Self {
        CipError::Service {
            status,
            message: message.into(),
            extended: None,
        }
    }

    pub fn routing(message: impl Into<String>) -> Self {
        CipError::Routing {
            message: message.into(),
        }
    }

    /// Translate this error to the general CIP status byte that belongs in
    /// a wire-level reply. Frame errors have no sensible status byte (the
    /// session is being dropped instead), so they map to a generic failure
    /// in case a caller insists on encoding one anyway.
    pub fn as_general_status(&self) -> CipStatus {
        match self {
            CipError::Frame { .. } => STATUS_PATH_SEGMENT_ERROR,
            CipError::Service { status, .. } => *status,
            CipError::Routing { .. } => STATUS_CONNECTION_FAILURE,
            CipError::Io(_) => STATUS_CONNECTION_FAILURE,
            CipError::Configuration(_) => STATUS_INVALID_PARAMETER_VALUE,
            CipError::Timeout => STATUS_CONNECTION_FAILURE,
        }
    }

    pub fn extended_status(&self) -> Option<u16> {
        match self {
            CipError::Service { extended, .. } => *extended,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CipError>;
