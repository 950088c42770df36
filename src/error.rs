use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the Wren invalidation bridge
#[derive(Debug)]
pub enum WrenError {
    /// Missing or invalid configuration (fatal at start)
    Config(String),

    /// Failure registering the RPC handler or a listener (fatal at start)
    Registration(String),

    /// Failure sending an invalidation to the cluster
    Dispatch(String),

    /// Failure publishing, reading or removing distributed-state entries
    StateSync(String),

    /// Failure unregistering handlers or listeners during shutdown
    Unregistration(String),

    /// Unclassified cluster transport errors (timeouts, unreachable nodes)
    Transport(String),

    /// Serialization/deserialization errors
    Serialization(SerializationError),

    /// Internal lock poisoning or concurrency errors
    Concurrency(String),

    /// Management API errors
    Api(String),

    /// System I/O errors
    Io(std::io::Error),
}

/// Serialization related errors
#[derive(Debug)]
pub enum SerializationError {
    /// Binary encoding of cluster payloads
    BinaryEncode(bincode::error::EncodeError),

    /// Binary decoding of cluster payloads
    BinaryDecode(bincode::error::DecodeError),

    /// JSON serialization/deserialization errors
    Json(serde_json::Error),
}

impl fmt::Display for WrenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrenError::Config(msg) => write!(f, "Configuration error: {}", msg),
            WrenError::Registration(msg) => write!(f, "Registration error: {}", msg),
            WrenError::Dispatch(msg) => write!(f, "Remote dispatch error: {}", msg),
            WrenError::StateSync(msg) => write!(f, "State sync error: {}", msg),
            WrenError::Unregistration(msg) => write!(f, "Unregistration error: {}", msg),
            WrenError::Transport(msg) => write!(f, "Transport error: {}", msg),
            WrenError::Serialization(err) => write!(f, "Serialization error: {}", err),
            WrenError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
            WrenError::Api(msg) => write!(f, "API error: {}", msg),
            WrenError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::BinaryEncode(err) => write!(f, "Binary encode: {}", err),
            SerializationError::BinaryDecode(err) => write!(f, "Binary decode: {}", err),
            SerializationError::Json(err) => write!(f, "JSON: {}", err),
        }
    }
}

impl std::error::Error for WrenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WrenError::Io(err) => Some(err),
            WrenError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for SerializationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializationError::BinaryEncode(err) => Some(err),
            SerializationError::BinaryDecode(err) => Some(err),
            SerializationError::Json(err) => Some(err),
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, WrenError>;

// Axum IntoResponse implementation for HTTP error responses
impl IntoResponse for WrenError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl WrenError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            WrenError::Config(_) => StatusCode::BAD_REQUEST,
            WrenError::Registration(_) => StatusCode::SERVICE_UNAVAILABLE,
            WrenError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
            WrenError::StateSync(_) => StatusCode::SERVICE_UNAVAILABLE,
            WrenError::Unregistration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WrenError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            WrenError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WrenError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WrenError::Api(_) => StatusCode::NOT_FOUND,
            WrenError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            WrenError::Config(_) => "configuration_error",
            WrenError::Registration(_) => "registration_error",
            WrenError::Dispatch(_) => "remote_dispatch_error",
            WrenError::StateSync(_) => "state_sync_error",
            WrenError::Unregistration(_) => "unregistration_error",
            WrenError::Transport(_) => "transport_error",
            WrenError::Serialization(_) => "serialization_error",
            WrenError::Concurrency(_) => "concurrency_error",
            WrenError::Api(_) => "api_error",
            WrenError::Io(_) => "io_error",
        }
    }
}

// Conversions from common error types
impl From<std::io::Error> for WrenError {
    fn from(err: std::io::Error) -> Self {
        WrenError::Io(err)
    }
}

impl From<serde_json::Error> for WrenError {
    fn from(err: serde_json::Error) -> Self {
        WrenError::Serialization(SerializationError::Json(err))
    }
}

impl From<bincode::error::EncodeError> for WrenError {
    fn from(err: bincode::error::EncodeError) -> Self {
        WrenError::Serialization(SerializationError::BinaryEncode(err))
    }
}

impl From<bincode::error::DecodeError> for WrenError {
    fn from(err: bincode::error::DecodeError) -> Self {
        WrenError::Serialization(SerializationError::BinaryDecode(err))
    }
}

impl From<SerializationError> for WrenError {
    fn from(err: SerializationError) -> Self {
        WrenError::Serialization(err)
    }
}

impl From<String> for WrenError {
    fn from(err: String) -> Self {
        WrenError::Transport(err)
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::WrenError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::WrenError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! state_sync_error {
    ($msg:expr) => {
        $crate::error::WrenError::StateSync($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::WrenError::StateSync(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! dispatch_error {
    ($msg:expr) => {
        $crate::error::WrenError::Dispatch($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::WrenError::Dispatch(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::WrenError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::WrenError::Transport(format!($fmt, $($arg)*))
    };
}
