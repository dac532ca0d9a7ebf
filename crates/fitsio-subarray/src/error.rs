use crate::host::Status;
use crate::types::{CodeScheme, ElementType, TypeCode};

/// All errors that can occur while addressing or transferring image pixels.
///
/// Every variant except [`Error::Host`] and [`Error::Io`] is raised before
/// the host is called, so a rejected request never mutates the file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The element type has no entry in the requested code scheme.
    #[error("element type {ty} has no {scheme} code")]
    UnsupportedType { ty: ElementType, scheme: CodeScheme },

    /// Reverse lookup of a code that no element type registered.
    #[error("unknown {scheme} code {code}")]
    InvalidCode { scheme: CodeScheme, code: TypeCode },

    /// The image stores a different element type than the handle declares.
    #[error("type mismatch: handle declares {expected}, image stores {found}")]
    TypeMismatch {
        expected: ElementType,
        found: ElementType,
    },

    /// Requested or derived geometry disagrees with a buffer or array shape.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// An index specification falls outside the image extent.
    #[error("index out of bounds: {0}")]
    OutOfBounds(String),

    /// A pixel interval or subset corner falls outside the image.
    #[error("pixel range out of range: {0}")]
    OutOfRange(String),

    /// The on-disk dimensionality changed since the handle was built.
    #[error("stale handle: declared {declared} axes but the image now has {live}")]
    StaleDimensionality { declared: usize, live: usize },

    /// A self-contradictory combination of optional transfer parameters.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Nonzero status reported by the host layer.
    #[error("host error {status}: {message}")]
    Host { status: i32, message: String },

    /// An I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a host status together with its message text.
    pub fn host(status: Status, message: impl Into<String>) -> Self {
        Error::Host {
            status: status.code(),
            message: message.into(),
        }
    }

    /// The host status code, if this error came from the host.
    pub fn host_status(&self) -> Option<i32> {
        match self {
            Error::Host { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unsupported_type() {
        let e = Error::UnsupportedType {
            ty: ElementType::Complex32,
            scheme: CodeScheme::Storage,
        };
        assert_eq!(e.to_string(), "element type complex32 has no storage code");
    }

    #[test]
    fn display_invalid_code() {
        let e = Error::InvalidCode {
            scheme: CodeScheme::Transfer,
            code: 99,
        };
        assert_eq!(e.to_string(), "unknown transfer code 99");
    }

    #[test]
    fn display_stale() {
        let e = Error::StaleDimensionality {
            declared: 2,
            live: 3,
        };
        assert_eq!(
            e.to_string(),
            "stale handle: declared 2 axes but the image now has 3"
        );
    }

    #[test]
    fn host_status_preserved() {
        let e = Error::host(Status::NUM_OVERFLOW, "numerical overflow");
        assert_eq!(e.host_status(), Some(412));
        assert_eq!(e.to_string(), "host error 412: numerical overflow");
        assert_eq!(Error::InvalidArgument("x").host_status(), None);
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::other("oops");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn std_error_source() {
        use std::error::Error as StdError;

        let e = Error::OutOfRange("x".into());
        assert!(e.source().is_none());

        let e = Error::Io(std::io::Error::other("inner"));
        assert!(e.source().is_some());
    }
}
