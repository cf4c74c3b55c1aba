//! Routing-specific extended status codes, layered on top of the general
//! CIP status bytes already defined in `crate::error`.

/// Extended status word used when Unconnected-Send routing fails because
/// no `Route` table entry matches the leading route_path segment.
pub const EXTENDED_NO_ROUTE: u16 = 0x0204;

/// Extended status word used when `Route Path = false` and a non-empty
/// route_path was presented.
pub const EXTENDED_ROUTE_PATH_REJECTED: u16 = 0x0205;

pub use crate::error::{
    CipStatus, STATUS_ATTRIBUTE_LIST_ERROR, STATUS_ATTRIBUTE_NOT_SETTABLE, STATUS_CONNECTION_FAILURE,
    STATUS_INVALID_ATTRIBUTE_VALUE, STATUS_INVALID_PARAMETER_VALUE, STATUS_NOT_ENOUGH_DATA,
    STATUS_OBJECT_DOES_NOT_EXIST, STATUS_PARTIAL_TRANSFER, STATUS_PATH_DESTINATION_UNKNOWN,
    STATUS_PATH_SEGMENT_ERROR, STATUS_RESOURCE_UNAVAILABLE, STATUS_SERVICE_NOT_SUPPORTED, STATUS_SUCCESS,
    STATUS_TOO_MUCH_DATA,
};
