//! The static schema registry: what the caller declares about its document
//! type before any frame is read.
//!
//! A document class declares its own fields, its annotation classes, and its
//! stores. Every declared field carries a typed `set` operation captured at
//! registration time, so materialization needs no reflection — the only
//! dynamic step left is the downcast from `&mut dyn Any` to the concrete
//! annotation type, and a failure there is a registration bug, not a data
//! error.

use std::any::{Any, TypeId};
use std::ops;

use crate::error::{Error, Result};
use crate::integer::Integer;
use crate::rt::RtManager;
use crate::slice::{ByteSlice, Slice};

/// How a declared field is written back out.
///
/// `ReadOnly` fields are materialized like any other, but their exact wire
/// bytes are also preserved in the owner's lazy slab so they re-emit
/// unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldMode {
    ReadWrite,
    ReadOnly,
}

/// Type tag for a primitive field declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Char,
    F32,
    F64,
    Str,
}

/// A single value decoded off the wire, before narrowing to the declared
/// field type. Pointer values are indexes into the field's target store.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Bool(bool),
    Int(Integer),
    F32(f32),
    F64(f64),
    Str(String),
    ByteSlice(ByteSlice),
    Pointer(usize),
    PointerSlice(Slice),
    Pointers(Vec<usize>),
}

impl FieldValue {
    fn kind_name(&self) -> &'static str {
        match *self {
            FieldValue::Bool(_) => "boolean",
            FieldValue::Int(_) => "integer",
            FieldValue::F32(_) => "f32",
            FieldValue::F64(_) => "f64",
            FieldValue::Str(_) => "string",
            FieldValue::ByteSlice(_) => "byte slice",
            FieldValue::Pointer(_) => "pointer",
            FieldValue::PointerSlice(_) => "pointer slice",
            FieldValue::Pointers(_) => "pointer collection",
        }
    }
}

fn value_mismatch(expected: &'static str, found: &FieldValue) -> Error {
    Error::Internal(format!(
        "field registered as {} received a {} value",
        expected,
        found.kind_name()
    ))
}

/// Rust types that can be declared as primitive docrep fields.
pub trait FieldPrimitive: Sized + 'static {
    const PRIMITIVE: Primitive;
    fn from_value(value: FieldValue) -> Result<Self>;
}

macro_rules! impl_int_primitive {
    ($t:ty, $tag:expr) => {
        impl FieldPrimitive for $t {
            const PRIMITIVE: Primitive = $tag;
            fn from_value(value: FieldValue) -> Result<Self> {
                match value {
                    FieldValue::Int(v) => v.to::<$t>().ok_or_else(|| {
                        Error::WireFormat(format!(
                            "integer {} does not fit in a {} field",
                            v,
                            stringify!($t)
                        ))
                    }),
                    other => Err(value_mismatch(stringify!($t), &other)),
                }
            }
        }
    };
}

impl_int_primitive!(u8, Primitive::U8);
impl_int_primitive!(i8, Primitive::I8);
impl_int_primitive!(u16, Primitive::U16);
impl_int_primitive!(i16, Primitive::I16);
impl_int_primitive!(u32, Primitive::U32);
impl_int_primitive!(i32, Primitive::I32);
impl_int_primitive!(u64, Primitive::U64);
impl_int_primitive!(i64, Primitive::I64);

impl FieldPrimitive for bool {
    const PRIMITIVE: Primitive = Primitive::Bool;
    fn from_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Bool(v) => Ok(v),
            other => Err(value_mismatch("bool", &other)),
        }
    }
}

impl FieldPrimitive for char {
    const PRIMITIVE: Primitive = Primitive::Char;
    fn from_value(value: FieldValue) -> Result<Self> {
        match value {
            // Characters travel as integers, narrowed through 16 bits.
            FieldValue::Int(v) => {
                let code: u16 = v.to().ok_or_else(|| {
                    Error::WireFormat(format!("integer {} does not fit in a char field", v))
                })?;
                char::from_u32(code as u32).ok_or_else(|| {
                    Error::WireFormat(format!("{:#06x} is not a valid character", code))
                })
            }
            other => Err(value_mismatch("char", &other)),
        }
    }
}

impl FieldPrimitive for f32 {
    const PRIMITIVE: Primitive = Primitive::F32;
    fn from_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::F32(v) => Ok(v),
            other => Err(value_mismatch("f32", &other)),
        }
    }
}

impl FieldPrimitive for f64 {
    const PRIMITIVE: Primitive = Primitive::F64;
    fn from_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::F64(v) => Ok(v),
            other => Err(value_mismatch("f64", &other)),
        }
    }
}

impl FieldPrimitive for String {
    const PRIMITIVE: Primitive = Primitive::Str;
    fn from_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Str(v) => Ok(v),
            other => Err(value_mismatch("string", &other)),
        }
    }
}

/// What a declared field holds. Pointer targets are identified by the
/// annotation type itself, so agreement between a pointer field and the store
/// it lands on is a type-level check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Primitive(Primitive),
    ByteSlice,
    Pointer {
        target: TypeId,
        slice: bool,
        collection: bool,
    },
    SelfPointer {
        slice: bool,
        collection: bool,
    },
}

impl FieldKind {
    pub fn is_pointer(&self) -> bool {
        matches!(self, FieldKind::Pointer { .. })
    }

    pub fn is_self_pointer(&self) -> bool {
        matches!(self, FieldKind::SelfPointer { .. })
    }

    pub fn is_slice(&self) -> bool {
        match *self {
            FieldKind::ByteSlice => true,
            FieldKind::Pointer { slice, .. } => slice,
            FieldKind::SelfPointer { slice, .. } => slice,
            FieldKind::Primitive(_) => false,
        }
    }

    pub fn is_collection(&self) -> bool {
        match *self {
            FieldKind::Pointer { collection, .. } => collection,
            FieldKind::SelfPointer { collection, .. } => collection,
            _ => false,
        }
    }
}

type SetFn = Box<dyn Fn(&mut dyn Any, FieldValue) -> Result<()> + Send + Sync>;

fn downcast<A: 'static>(target: &mut dyn Any) -> Result<&mut A> {
    target.downcast_mut::<A>().ok_or_else(|| {
        Error::Internal("schema accessor applied to an instance of the wrong type".to_string())
    })
}

/// One declared field of a document or annotation class.
pub struct FieldSchema {
    pub(crate) name: &'static str,
    pub(crate) serial: &'static str,
    pub(crate) mode: FieldMode,
    pub(crate) kind: FieldKind,
    set: SetFn,
}

impl FieldSchema {
    fn build(name: &'static str, kind: FieldKind, set: SetFn) -> FieldSchema {
        FieldSchema {
            name,
            serial: name,
            mode: FieldMode::ReadWrite,
            kind,
            set,
        }
    }

    /// Declare a primitive field. The target type fixes the declared width;
    /// wire integers are narrowed to it on read.
    pub fn primitive<A: 'static, P: FieldPrimitive>(
        name: &'static str,
        get: fn(&mut A) -> &mut P,
    ) -> FieldSchema {
        Self::build(
            name,
            FieldKind::Primitive(P::PRIMITIVE),
            Box::new(move |target, value| {
                *get(downcast::<A>(target)?) = P::from_value(value)?;
                Ok(())
            }),
        )
    }

    /// Declare a byte-slice field (a span of the original document text).
    pub fn byte_slice<A: 'static>(
        name: &'static str,
        get: fn(&mut A) -> &mut ByteSlice,
    ) -> FieldSchema {
        Self::build(
            name,
            FieldKind::ByteSlice,
            Box::new(move |target, value| match value {
                FieldValue::ByteSlice(v) => {
                    *get(downcast::<A>(target)?) = v;
                    Ok(())
                }
                other => Err(value_mismatch("byte slice", &other)),
            }),
        )
    }

    /// Declare a pointer into the store holding annotations of type `T`.
    pub fn pointer<A: 'static, T: 'static>(
        name: &'static str,
        get: fn(&mut A) -> &mut usize,
    ) -> FieldSchema {
        Self::build(
            name,
            FieldKind::Pointer {
                target: TypeId::of::<T>(),
                slice: false,
                collection: false,
            },
            Box::new(move |target, value| match value {
                FieldValue::Pointer(v) => {
                    *get(downcast::<A>(target)?) = v;
                    Ok(())
                }
                other => Err(value_mismatch("pointer", &other)),
            }),
        )
    }

    /// Declare a contiguous slice of pointers into the store holding `T`.
    pub fn pointer_slice<A: 'static, T: 'static>(
        name: &'static str,
        get: fn(&mut A) -> &mut Slice,
    ) -> FieldSchema {
        Self::build(
            name,
            FieldKind::Pointer {
                target: TypeId::of::<T>(),
                slice: true,
                collection: false,
            },
            Box::new(move |target, value| match value {
                FieldValue::PointerSlice(v) => {
                    *get(downcast::<A>(target)?) = v;
                    Ok(())
                }
                other => Err(value_mismatch("pointer slice", &other)),
            }),
        )
    }

    /// Declare an arbitrary ordered collection of pointers into the store
    /// holding `T`.
    pub fn pointers<A: 'static, T: 'static>(
        name: &'static str,
        get: fn(&mut A) -> &mut Vec<usize>,
    ) -> FieldSchema {
        Self::build(
            name,
            FieldKind::Pointer {
                target: TypeId::of::<T>(),
                slice: false,
                collection: true,
            },
            Box::new(move |target, value| match value {
                FieldValue::Pointers(v) => {
                    *get(downcast::<A>(target)?) = v;
                    Ok(())
                }
                other => Err(value_mismatch("pointer collection", &other)),
            }),
        )
    }

    /// Declare a pointer that resolves against whichever store the annotation
    /// is being decoded from.
    pub fn self_pointer<A: 'static>(
        name: &'static str,
        get: fn(&mut A) -> &mut usize,
    ) -> FieldSchema {
        Self::build(
            name,
            FieldKind::SelfPointer {
                slice: false,
                collection: false,
            },
            Box::new(move |target, value| match value {
                FieldValue::Pointer(v) => {
                    *get(downcast::<A>(target)?) = v;
                    Ok(())
                }
                other => Err(value_mismatch("pointer", &other)),
            }),
        )
    }

    /// Declare a slice of self-pointers.
    pub fn self_pointer_slice<A: 'static>(
        name: &'static str,
        get: fn(&mut A) -> &mut Slice,
    ) -> FieldSchema {
        Self::build(
            name,
            FieldKind::SelfPointer {
                slice: true,
                collection: false,
            },
            Box::new(move |target, value| match value {
                FieldValue::PointerSlice(v) => {
                    *get(downcast::<A>(target)?) = v;
                    Ok(())
                }
                other => Err(value_mismatch("pointer slice", &other)),
            }),
        )
    }

    /// Declare a collection of self-pointers.
    pub fn self_pointers<A: 'static>(
        name: &'static str,
        get: fn(&mut A) -> &mut Vec<usize>,
    ) -> FieldSchema {
        Self::build(
            name,
            FieldKind::SelfPointer {
                slice: false,
                collection: true,
            },
            Box::new(move |target, value| match value {
                FieldValue::Pointers(v) => {
                    *get(downcast::<A>(target)?) = v;
                    Ok(())
                }
                other => Err(value_mismatch("pointer collection", &other)),
            }),
        )
    }

    /// Override the name this field travels under on the wire. Defaults to
    /// the in-memory name.
    pub fn serial(mut self, serial: &'static str) -> FieldSchema {
        self.serial = serial;
        self
    }

    /// Mark the field read-only: materialized on read, and its original wire
    /// bytes preserved for re-emission.
    pub fn read_only(mut self) -> FieldSchema {
        self.mode = FieldMode::ReadOnly;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn serial_name(&self) -> &'static str {
        self.serial
    }

    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub(crate) fn set_value(&self, target: &mut dyn Any, value: FieldValue) -> Result<()> {
        (self.set)(target, value)
    }
}

impl std::fmt::Debug for FieldSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("FieldSchema")
            .field("name", &self.name)
            .field("serial", &self.serial)
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A declared annotation class: the element type of one or more stores.
#[derive(Debug)]
pub struct AnnSchema {
    pub(crate) name: &'static str,
    pub(crate) serial: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) fields: Vec<FieldSchema>,
}

impl AnnSchema {
    pub fn new<A: Ann>(name: &'static str, fields: Vec<FieldSchema>) -> AnnSchema {
        AnnSchema {
            name,
            serial: name,
            type_id: TypeId::of::<A>(),
            fields,
        }
    }

    /// Override the name this class travels under on the wire.
    pub fn serial(mut self, serial: &'static str) -> AnnSchema {
        self.serial = serial;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn serial_name(&self) -> &'static str {
        self.serial
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
}

/// An index-addressable sequence of annotations of one class, owned by the
/// document. Sized once per frame by the reader; indices `[0, len)` stay
/// valid for the rest of the decode.
#[derive(Clone, Debug)]
pub struct Store<A> {
    items: Vec<A>,
}

impl<A> Default for Store<A> {
    fn default() -> Store<A> {
        Store { items: Vec::new() }
    }
}

impl<A: Ann> Store<A> {
    pub fn new() -> Store<A> {
        Store::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&A> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut A> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<A> {
        self.items.iter()
    }

    pub(crate) fn resize_default(&mut self, nelem: usize) {
        self.items.clear();
        self.items.resize_with(nelem, A::default);
    }
}

impl<A: Ann> ops::Index<usize> for Store<A> {
    type Output = A;
    fn index(&self, index: usize) -> &A {
        &self.items[index]
    }
}

impl<A: Ann> ops::IndexMut<usize> for Store<A> {
    fn index_mut(&mut self, index: usize) -> &mut A {
        &mut self.items[index]
    }
}

impl<'a, A: Ann> IntoIterator for &'a Store<A> {
    type Item = &'a A;
    type IntoIter = std::slice::Iter<'a, A>;
    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Preserved opaque wire data: packed `(field id, value)` pairs without the
/// enclosing map header, plus the pair count so a writer can re-emit that
/// header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LazySlab {
    pub bytes: Vec<u8>,
    pub nelem: usize,
}

/// Implemented by annotation types. The single obligation beyond `Default` is
/// a slot for the lazy slab the reader may attach.
pub trait Ann: Default + 'static {
    fn lazy(&self) -> Option<&LazySlab>;
    fn lazy_slot(&mut self) -> &mut Option<LazySlab>;
}

/// Implemented by document types: slots for the per-frame runtime schema and
/// for the document's own lazy slab.
pub trait Doc: Default + 'static {
    fn rt(&self) -> Option<&RtManager>;
    fn rt_slot(&mut self) -> &mut Option<RtManager>;
    fn lazy(&self) -> Option<&LazySlab>;
    fn lazy_slot(&mut self) -> &mut Option<LazySlab>;
}

/// The store-side operations the reader needs, erased over the annotation
/// type. All three derive from the single accessor given at registration.
pub(crate) trait StoreOps<D>: Send + Sync {
    fn stored_type(&self) -> TypeId;
    fn resize(&self, doc: &mut D, nelem: usize);
    fn ann_mut<'a>(&self, doc: &'a mut D, index: usize) -> Option<&'a mut dyn Any>;
    fn attach_lazy(&self, doc: &mut D, index: usize, slab: LazySlab);
}

struct StoreAccess<D, A> {
    get: fn(&mut D) -> &mut Store<A>,
}

impl<D, A: Ann> StoreOps<D> for StoreAccess<D, A> {
    fn stored_type(&self) -> TypeId {
        TypeId::of::<A>()
    }

    fn resize(&self, doc: &mut D, nelem: usize) {
        (self.get)(doc).resize_default(nelem);
    }

    fn ann_mut<'a>(&self, doc: &'a mut D, index: usize) -> Option<&'a mut dyn Any> {
        (self.get)(doc)
            .get_mut(index)
            .map(|ann| ann as &mut dyn Any)
    }

    fn attach_lazy(&self, doc: &mut D, index: usize, slab: LazySlab) {
        if let Some(ann) = (self.get)(doc).get_mut(index) {
            *ann.lazy_slot() = Some(slab);
        }
    }
}

/// One declared store of the document class.
pub struct StoreSchema<D> {
    pub(crate) name: &'static str,
    pub(crate) serial: &'static str,
    pub(crate) ops: Box<dyn StoreOps<D>>,
}

impl<D: 'static> StoreSchema<D> {
    pub fn new<A: Ann>(name: &'static str, get: fn(&mut D) -> &mut Store<A>) -> StoreSchema<D> {
        StoreSchema {
            name,
            serial: name,
            ops: Box::new(StoreAccess { get }),
        }
    }

    /// Override the name this store travels under on the wire.
    pub fn serial(mut self, serial: &'static str) -> StoreSchema<D> {
        self.serial = serial;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn serial_name(&self) -> &'static str {
        self.serial
    }
}

impl<D> std::fmt::Debug for StoreSchema<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("StoreSchema")
            .field("name", &self.name)
            .field("serial", &self.serial)
            .finish()
    }
}

/// The complete static declaration for one document class.
#[derive(Debug)]
pub struct DocSchema<D> {
    pub(crate) name: &'static str,
    pub(crate) fields: Vec<FieldSchema>,
    pub(crate) klasses: Vec<AnnSchema>,
    pub(crate) stores: Vec<StoreSchema<D>>,
}

impl<D: Doc> DocSchema<D> {
    pub fn new(name: &'static str) -> DocSchema<D> {
        DocSchema {
            name,
            fields: Vec::new(),
            klasses: Vec::new(),
            stores: Vec::new(),
        }
    }

    /// Declare one of the document's own fields.
    pub fn field(mut self, field: FieldSchema) -> DocSchema<D> {
        self.fields.push(field);
        self
    }

    /// Register an annotation class.
    pub fn klass(mut self, klass: AnnSchema) -> DocSchema<D> {
        self.klasses.push(klass);
        self
    }

    /// Register a store.
    pub fn store(mut self, store: StoreSchema<D>) -> DocSchema<D> {
        self.stores.push(store);
        self
    }

    /// Whether the document class declares any fields of its own. When it
    /// does not, document instances are preserved verbatim rather than
    /// parsed.
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn doc_type(&self) -> TypeId {
        TypeId::of::<D>()
    }
}
