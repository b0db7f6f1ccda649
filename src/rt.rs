//! The runtime schema: what one frame's header actually declared, reconciled
//! against the static registry.
//!
//! Rebuilt from scratch for every document — the format is self-describing,
//! so two frames on the same stream may disagree about classes, stores, and
//! field numbering. Entities that found no static counterpart are *lazy*:
//! their bytes are preserved verbatim and never structurally interpreted.
//!
//! References inside the graph are stable integer ids assigned in block
//! order: a field's target store is a store id, a store's class is a klass
//! id. Pointer targets are filled in by a second pass once the stores block
//! has been read.

/// Which static declaration a runtime class bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StaticKlass {
    /// The document class itself (stream name `__meta__`).
    Meta,
    /// Index into the registered annotation classes.
    Ann(usize),
}

/// One field of a runtime class, as declared on the stream.
#[derive(Debug)]
pub struct RtField {
    pub(crate) id: usize,
    pub(crate) serial: String,
    pub(crate) is_pointer: bool,
    pub(crate) is_slice: bool,
    pub(crate) is_self_pointer: bool,
    pub(crate) is_collection: bool,
    /// Index of the matching static field within its class, if any.
    pub(crate) static_field: Option<usize>,
    /// Target store id, filled by pointer back-fill.
    pub(crate) store_id: Option<usize>,
}

impl RtField {
    pub fn id(&self) -> usize {
        self.id
    }

    /// The name this field travels under on the wire.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn is_pointer(&self) -> bool {
        self.is_pointer
    }

    pub fn is_slice(&self) -> bool {
        self.is_slice
    }

    pub fn is_self_pointer(&self) -> bool {
        self.is_self_pointer
    }

    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    /// Lazy fields have no static counterpart; their values are buffered
    /// verbatim.
    pub fn is_lazy(&self) -> bool {
        self.static_field.is_none()
    }

    /// Id of the store this pointer field targets, once back-filled.
    pub fn store_id(&self) -> Option<usize> {
        self.store_id
    }
}

/// One class of the frame's classes block.
#[derive(Debug)]
pub struct RtKlass {
    pub(crate) id: usize,
    pub(crate) serial: String,
    pub(crate) fields: Vec<RtField>,
    pub(crate) static_klass: Option<StaticKlass>,
    /// Verbatim document-instance bytes, used only on the document class when
    /// the caller declared no document fields.
    pub(crate) lazy_bytes: Option<Vec<u8>>,
}

impl RtKlass {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn fields(&self) -> &[RtField] {
        &self.fields
    }

    pub fn is_lazy(&self) -> bool {
        self.static_klass.is_none()
    }

    pub fn lazy_bytes(&self) -> Option<&[u8]> {
        self.lazy_bytes.as_deref()
    }
}

/// One store of the frame's stores block.
#[derive(Debug)]
pub struct RtStore {
    pub(crate) id: usize,
    pub(crate) serial: String,
    pub(crate) klass_id: usize,
    pub(crate) nelem: usize,
    /// Index of the matching static store declaration, if any.
    pub(crate) static_store: Option<usize>,
    /// Verbatim instance-group bytes for lazy stores.
    pub(crate) lazy_bytes: Option<Vec<u8>>,
}

impl RtStore {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Id of the runtime class this store holds.
    pub fn klass_id(&self) -> usize {
        self.klass_id
    }

    /// Element count declared in the stores block.
    pub fn nelem(&self) -> usize {
        self.nelem
    }

    pub fn is_lazy(&self) -> bool {
        self.static_store.is_none()
    }

    pub fn lazy_bytes(&self) -> Option<&[u8]> {
        self.lazy_bytes.as_deref()
    }
}

/// The reconciled schema for one decoded frame, attached to the document it
/// produced. A writer walks this to re-emit everything the caller never
/// declared.
#[derive(Debug)]
pub struct RtManager {
    pub(crate) klasses: Vec<RtKlass>,
    pub(crate) doc_klass: usize,
    pub(crate) stores: Vec<RtStore>,
}

impl RtManager {
    /// All classes of the frame, in klass-id order.
    pub fn klasses(&self) -> &[RtKlass] {
        &self.klasses
    }

    /// All stores of the frame, in store-id order.
    pub fn stores(&self) -> &[RtStore] {
        &self.stores
    }

    /// The class declared as `__meta__`.
    pub fn doc_klass(&self) -> &RtKlass {
        &self.klasses[self.doc_klass]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lazy_flags_follow_static_binding() {
        let field = RtField {
            id: 0,
            serial: "text".to_string(),
            is_pointer: false,
            is_slice: false,
            is_self_pointer: false,
            is_collection: false,
            static_field: None,
            store_id: None,
        };
        assert!(field.is_lazy());

        let klass = RtKlass {
            id: 0,
            serial: "token".to_string(),
            fields: vec![field],
            static_klass: Some(StaticKlass::Ann(0)),
            lazy_bytes: None,
        };
        assert!(!klass.is_lazy());
        assert!(klass.fields()[0].is_lazy());

        let store = RtStore {
            id: 0,
            serial: "tokens".to_string(),
            klass_id: 0,
            nelem: 2,
            static_store: None,
            lazy_bytes: Some(vec![1, 2, 3]),
        };
        assert!(store.is_lazy());
        assert_eq!(store.lazy_bytes(), Some(&[1u8, 2, 3][..]));
    }
}
