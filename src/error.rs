//! Centralized error handling for graphwire.
//!
//! Every failure of the codec is reported through [`GraphError`]; the library never
//! panics on malformed input. This is enforced through `#![deny(clippy::panic)]` and
//! `#![deny(clippy::unwrap_used)]` at the crate root.
//!
//! ## Error Categories
//!
//! - **Stream framing** ([`GraphError::BadMagic`], [`GraphError::Truncated`],
//!   [`GraphError::Format`]): the byte stream is not a graphwire stream, ended early,
//!   or contains an invalid tag, flag set, or length.
//! - **Schema resolution** ([`GraphError::UnknownTypeHandle`],
//!   [`GraphError::UnresolvableType`], [`GraphError::UnknownEnumConstant`],
//!   [`GraphError::TypeMismatch`]): the stream references types the local registry
//!   cannot map, or a value does not fit its declared slot.
//! - **User code** ([`GraphError::HookFailure`], [`GraphError::ExternalizationFailure`],
//!   [`GraphError::Message`]): a custom hook or externalization routine failed.
//!
//! A session that returned an error must be discarded: its handle tables may be
//! left half-populated.
//!
//! ```rust
//! use graphwire::{GraphCodec, GraphError, TypeRegistry};
//!
//! let codec = GraphCodec::new(TypeRegistry::new());
//! match codec.from_bytes(b"NOPE\x03") {
//!     Err(GraphError::BadMagic { found, .. }) => assert_eq!(&found, b"NOPE"),
//!     other => panic!("unexpected result: {other:?}"),
//! }
//! ```

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// A specialized `Result` type for graphwire operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// The master error enum covering all failure domains of the codec.
///
/// The type is `Clone`; I/O errors are wrapped in an `Arc` for that purpose.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    /// Low-level I/O failure of the underlying sink or source.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The stream does not start with the expected magic prefix.
    #[error("bad magic: expected {expected:02x?}, found {found:02x?}")]
    BadMagic {
        /// The prefix this codec writes.
        expected: [u8; 4],
        /// The four bytes actually read.
        found: [u8; 4],
    },

    /// A payload references a descriptor handle that was never introduced.
    #[error("unknown type handle {0}")]
    UnknownTypeHandle(u32),

    /// A wire name (or a local type) has no counterpart in the type registry.
    #[error("unresolvable type `{0}`")]
    UnresolvableType(String),

    /// An enum constant name is not a variant of the local enum.
    #[error("enum `{type_name}` has no constant named `{constant}`")]
    UnknownEnumConstant {
        /// Wire name of the enum type.
        type_name: String,
        /// The constant name found in the stream.
        constant: String,
    },

    /// A custom read/write hook returned an error.
    #[error("custom hook of `{type_name}` failed")]
    HookFailure {
        /// Wire name of the type whose hook failed.
        type_name: String,
        /// The error raised inside the hook.
        #[source]
        source: Box<GraphError>,
    },

    /// An externalization routine returned an error.
    #[error("externalization of `{type_name}` failed")]
    ExternalizationFailure {
        /// Wire name of the externalizable type.
        type_name: String,
        /// The error raised inside the routine.
        #[source]
        source: Box<GraphError>,
    },

    /// The source was exhausted in the middle of a value.
    #[error("stream truncated in the middle of a value")]
    Truncated,

    /// The stream is structurally invalid (unknown tag, invalid flags, oversize lengths, ...).
    #[error("format error: {0}")]
    Format(String),

    /// A value does not fit the field, array or descriptor it was assigned to.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Two distinct local types were registered under the same wire name.
    #[error("wire name `{0}` is already registered")]
    DuplicateWireName(String),

    /// An error raised by user code (hooks, externalization routines).
    #[error("{0}")]
    Message(String),

    /// A broken internal invariant, such as an object already borrowed mutably.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphError {
    /// Creates a [`GraphError::Message`] from user code.
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Walks through hook and externalization wrappers to the innermost error.
    pub fn root_cause(&self) -> &GraphError {
        let mut current = self;
        while let Self::HookFailure { source, .. } | Self::ExternalizationFailure { source, .. } =
            current
        {
            current = source;
        }
        current
    }

    pub(crate) fn hook(type_name: &str, err: GraphError) -> Self {
        match err {
            e @ (Self::HookFailure { .. } | Self::ExternalizationFailure { .. }) => e,
            e => Self::HookFailure {
                type_name: type_name.to_owned(),
                source: Box::new(e),
            },
        }
    }

    pub(crate) fn external(type_name: &str, err: GraphError) -> Self {
        match err {
            e @ (Self::HookFailure { .. } | Self::ExternalizationFailure { .. }) => e,
            e => Self::ExternalizationFailure {
                type_name: type_name.to_owned(),
                source: Box::new(e),
            },
        }
    }
}

impl From<io::Error> for GraphError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(Arc::new(err))
        }
    }
}
