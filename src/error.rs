//! Library error types.

use std::fmt;

/// A docrep Result, normally returning a docrep [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A docrep reader error. Every error is terminal for the frame being read;
/// the reader that produced it must be discarded.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The input ended partway through a document frame. Running out of input
    /// before the wire-version byte of a frame is not an error — that is the
    /// normal end of the stream.
    TruncatedFrame {
        /// What the reader was doing when the input ran out.
        step: &'static str,
    },
    /// The stream declares a wire version this reader cannot read.
    BadWireVersion(u8),
    /// Malformed MessagePack structure: wrong value kind, unexpected map key,
    /// tuple of the wrong arity, or an unsupported marker.
    WireFormat(String),
    /// The stream and the static schema disagree: a structural flag differs,
    /// a pointer field and its target store name different classes, or a
    /// store and its stream class name different annotation types.
    SchemaMismatch(String),
    /// An id or length was outside its valid range.
    Bounds {
        /// Which quantity was out of range.
        what: &'static str,
        /// The offending value.
        value: u64,
        /// The exclusive upper bound it had to stay under.
        limit: u64,
    },
    /// The classes block contained no class named `__meta__`.
    MissingMeta,
    /// An annotation could not be materialized. Indicates a registration bug:
    /// a schema whose accessors do not match the instance types it is applied
    /// to.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::TruncatedFrame { step } => {
                write!(f, "Input ended inside a document frame on step [{}]", step)
            }
            Error::BadWireVersion(found) => write!(
                f,
                "Invalid wire format version. Stream has version {} but only version {} can be \
                 read. Ensure the input is not plain text",
                found,
                crate::WIRE_VERSION
            ),
            Error::WireFormat(ref err) => write!(f, "Malformed wire data: {}", err),
            Error::SchemaMismatch(ref err) => write!(f, "Schema mismatch: {}", err),
            Error::Bounds { what, value, limit } => {
                write!(f, "Out of range: {} was {}, limit is {}", what, value, limit)
            }
            Error::MissingMeta => write!(f, "Did not read in a __meta__ class"),
            Error::Internal(ref err) => write!(f, "Internal error: {}", err),
        }
    }
}

impl std::error::Error for Error {}
