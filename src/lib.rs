//! Streaming reader for docrep, a self-describing binary document format for
//! annotated text.
//!
//! Every frame on a docrep stream carries its own schema: the classes it
//! uses, their fields, and the stores holding annotation instances. A
//! [`Reader`] reconciles that embedded schema against the caller's static
//! [`DocSchema`] declaration, materializes typed documents and annotations,
//! resolves cross-store pointer fields, and preserves anything the caller did
//! not declare — whole classes, stores, or individual fields — as verbatim
//! byte slabs so documents round-trip without loss.

mod error;
mod integer;
mod marker;
mod pack;
mod reader;
mod rt;
mod schema;
mod slice;
mod wire;

pub use error::{Error, Result};
pub use integer::Integer;
pub use pack::Packer;
pub use reader::Reader;
pub use rt::{RtField, RtKlass, RtManager, RtStore};
pub use schema::{
    Ann, AnnSchema, Doc, DocSchema, FieldKind, FieldMode, FieldPrimitive, FieldSchema, FieldValue,
    LazySlab, Primitive, Store, StoreSchema,
};
pub use slice::{ByteSlice, Slice};
pub use wire::WireReader;

/// docrep wire protocol version that this reader knows how to read.
pub const WIRE_VERSION: u8 = 3;

/// Maximum nesting depth of a single packed value.
pub const MAX_DEPTH: usize = 100;

/// Largest byte length an instance group may declare: the platform's maximum
/// in-memory array size.
pub const MAX_GROUP_SIZE: u64 = isize::MAX as u64;
