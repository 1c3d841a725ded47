//! Error types for the information manager

use std::fmt;

use crate::pool::PoolError;

/// Result type alias for information manager operations
pub type ImResult<T> = Result<T, ImError>;

/// Errors that can occur while coordinating monitoring drivers
///
/// Only `Startup` is fatal. Everything else is handled where it happens:
/// logged, attached to the affected host, or dropped with the message.
#[derive(Debug)]
pub enum ImError {
    /// The driver-process layer failed to initialize
    Startup(String),

    /// No live handle is registered under the requested driver name
    DriverNotFound(String),

    /// A state name, attribute document or wire line could not be decoded
    Decode(String),

    /// The target host no longer exists in the pool
    HostNotFound(i32),

    /// The host pool rejected an operation
    Pool(PoolError),
}

impl fmt::Display for ImError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImError::Startup(msg) => {
                write!(f, "error starting information manager: {}", msg)
            }
            ImError::DriverNotFound(name) => write!(f, "cannot find driver: '{}'", name),
            ImError::Decode(msg) => write!(f, "decode error: {}", msg),
            ImError::HostNotFound(oid) => write!(f, "host {} not found", oid),
            ImError::Pool(err) => write!(f, "host pool error: {}", err),
        }
    }
}

impl std::error::Error for ImError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImError::Pool(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PoolError> for ImError {
    fn from(err: PoolError) -> Self {
        ImError::Pool(err)
    }
}

impl From<crate::template::TemplateError> for ImError {
    fn from(err: crate::template::TemplateError) -> Self {
        ImError::Decode(err.to_string())
    }
}
