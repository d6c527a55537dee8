//! # graphwire
//!
//! A graph-aware binary serializer for Rust object graphs: shared references and
//! cycles survive a round trip, and type descriptions travel inline with the data.
//!
//! ## Overview
//!
//! A graph is made of [`Value`]s. Objects are shared cells (`Rc<RefCell<T>>`) of
//! types registered in a [`TypeRegistry`]; `#[derive(Graph)]` produces the static
//! type information the codec walks in place of runtime reflection.
//!
//! ### Key Features
//!
//! *   **Identity Preservation:** every value is written once per session; later
//!     occurrences become handle back-references, so `a.next == a` and shared
//!     children come back as shared instances.
//! *   **Inline Schema:** each type is described once per session, in a `TYPE_BLOCK`
//!     preceding the first record that uses it. Fields are matched by name on read,
//!     so adding or removing a field does not break older streams.
//! *   **Inheritance by Composition:** a `#[graph(base)]` field embeds the base type;
//!     levels are written base first and restored in the same order.
//! *   **Custom Encodings:** a level may take over its own encoding through
//!     [`CustomFields`] (optionally mixing in the default field walk and a named
//!     [`PutFields`] set), or a type may encode itself completely through
//!     [`Externalize`].
//!
//! ## Stream Format
//!
//! ```text
//! MAGIC "GWIR" · value*
//! value := TYPE_BLOCK* (OBJECT handle [type_handle payload] | NULL | TYPE_VALUE type_handle)
//! ```
//!
//! All integers are big-endian; see [`format`] and [`descriptor`] for the layouts.
//!
//! ## Usage
//!
//! ```rust
//! use graphwire::{Graph, GraphCodec, Shared, TypeRegistry, Value, shared};
//!
//! #[derive(Default, Graph)]
//! #[graph(name = "demo.ListNode")]
//! struct ListNode {
//!     value: i32,
//!     next: Option<Shared<ListNode>>,
//! }
//!
//! # fn main() -> graphwire::Result<()> {
//! let mut registry = TypeRegistry::new();
//! registry.register::<ListNode>()?;
//! let codec = GraphCodec::new(registry);
//!
//! let a = shared(ListNode { value: 1, next: None });
//! let b = shared(ListNode { value: 2, next: Some(a.clone()) });
//! a.borrow_mut().next = Some(b.clone());
//!
//! let bytes = codec.to_bytes(&Value::object(&a))?;
//! let decoded = codec.from_bytes(&bytes)?;
//! let a2 = decoded.downcast::<ListNode>().expect("a list node");
//! let b2 = a2.borrow().next.clone().expect("a successor");
//! let back = b2.borrow().next.clone().expect("a cycle");
//! assert!(std::rc::Rc::ptr_eq(&a2, &back));
//! # Ok(())
//! # }
//! ```
//!
//! ## Sessions and Threads
//!
//! A [`GraphWriter`] or [`GraphReader`] is one session: it owns the handle tables
//! of one stream and is used from one thread. Values are `Rc`-based and therefore
//! not `Send`. The [`TypeRegistry`] is immutable once built and shared through an
//! `Arc`.
//!
//! ### Safety and Error Handling
//!
//! * **No Unsafe:** the crate denies `unsafe_code`.
//! * **No Panics:** no `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** every failure is a [`GraphError`]; a session that
//!   failed must be discarded.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// Lets the derive macro's absolute paths resolve inside this crate's own tests.
extern crate self as graphwire;

// --- PUBLIC API MODULES ---
pub mod api;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod hook;
pub mod inspector;
pub mod reader;
pub mod reflect;
pub mod registry;
pub mod session;
pub mod value;
pub mod writer;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod io;

// --- MACRO SUPPORT MODULES ---

/// Runtime utilities used by the derived code.
#[doc(hidden)]
pub mod rt;

// --- RE-EXPORTS ---

pub use api::{GraphCodec, deserialize, serialize};
pub use config::CodecConfig;
pub use descriptor::{Encoding, FieldDescriptor, TypeDescriptor};
pub use error::{GraphError, Result};
pub use hook::{GetFields, ObjectInput, ObjectOutput, PutFields};
pub use inspector::{StreamInspector, StreamReport};
pub use reader::{GraphReader, ReadStats};
pub use reflect::{ArrayElement, CustomFields, EnumType, Externalize, FieldValue, Reflect};
pub use registry::{TypeInfo, TypeRegistry, TypeShape};
pub use session::{ReadSession, WriteSession};
pub use value::{ArrayData, ArrayRef, EnumValue, ObjectRef, PrimitiveKind, Shared, TypeKey, Value, shared};
pub use writer::GraphWriter;

// Re-export the derive macro so it is accessible as `graphwire::Graph`
pub use graphwire_derive::Graph;

/// Constants used throughout the library.
pub mod constants {
    /// The default scratch buffer size for bulk primitive arrays.
    pub const DEFAULT_SCRATCH_SIZE: usize = 4 * 1024;
    /// The default largest string a reader accepts, in bytes.
    pub const DEFAULT_MAX_STRING_LEN: u32 = 64 * 1024 * 1024;
}
