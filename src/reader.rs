//! Reads docrep documents of a caller-declared type off a byte stream.
//!
//! Each frame is self-describing: its header declares classes, their fields,
//! and the stores holding annotation instances. The reader reconciles that
//! header against the static [`DocSchema`], materializes instances for
//! everything the caller declared, and preserves everything else as verbatim
//! byte slabs so a writer can re-emit the document without loss.

use std::any::Any;
use std::collections::HashMap;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::pack::Packer;
use crate::rt::{RtField, RtKlass, RtManager, RtStore, StaticKlass};
use crate::schema::{
    Doc, DocSchema, FieldKind, FieldMode, FieldSchema, FieldValue, LazySlab, Primitive, StoreOps,
};
use crate::slice::{ByteSlice, Slice};
use crate::wire::WireReader;
use crate::{MAX_GROUP_SIZE, WIRE_VERSION};

/// A pointer field waiting for its target store, recorded while the classes
/// block is read and resolved after the stores block.
struct PointerFixup {
    klass: usize,
    field: usize,
    store_id: usize,
}

/// Streaming reader yielding documents of type `D`.
///
/// Running out of input before the first byte of a frame is the normal end of
/// the stream. Any error is terminal: the reader reports no further documents
/// afterwards and must be discarded.
pub struct Reader<'a, D: Doc> {
    wire: WireReader<'a>,
    schema: &'a DocSchema<D>,
    failed: bool,
}

impl<'a, D: Doc> Reader<'a, D> {
    pub fn new(buf: &'a [u8], schema: &'a DocSchema<D>) -> Reader<'a, D> {
        Reader {
            wire: WireReader::new(buf),
            schema,
            failed: false,
        }
    }

    /// Read the next document frame. `Ok(None)` means the stream ended
    /// cleanly before the frame started.
    pub fn read_next(&mut self) -> Result<Option<D>> {
        if self.failed || self.wire.is_at_end() {
            return Ok(None);
        }
        match self.read_doc() {
            Ok(doc) => Ok(Some(doc)),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    fn read_doc(&mut self) -> Result<D> {
        // <doc> ::= <wire_version> <klasses> <stores> <doc_instance> <instances_groups>
        let version = self.wire.read_u8("wire version")?;
        if version != WIRE_VERSION {
            return Err(Error::BadWireVersion(version));
        }

        let mut doc = D::default();
        let (mut klasses, fixups, doc_klass) = self.read_klasses()?;
        trace!(
            "classes block: {} classes, document class is #{}",
            klasses.len(),
            doc_klass
        );
        let stores = self.read_stores(&mut doc, &klasses)?;
        trace!("stores block: {} stores", stores.len());
        self.bind_pointers(&mut klasses, &stores, &fixups)?;

        let mut rt = RtManager {
            klasses,
            doc_klass,
            stores,
        };
        self.read_doc_instance(&mut doc, &mut rt)?;
        self.read_store_groups(&mut doc, &mut rt)?;
        *doc.rt_slot() = Some(rt);
        Ok(doc)
    }

    /// Parse the classes block and reconcile each class and field against the
    /// static registry. Returns the runtime classes, the pointer fields still
    /// waiting on their target stores, and the klass id of `__meta__`.
    fn read_klasses(&mut self) -> Result<(Vec<RtKlass>, Vec<PointerFixup>, usize)> {
        let schema = self.schema;
        let mut by_serial: HashMap<&str, StaticKlass> = HashMap::new();
        by_serial.insert("__meta__", StaticKlass::Meta);
        for (i, klass) in schema.klasses.iter().enumerate() {
            by_serial.insert(klass.serial, StaticKlass::Ann(i));
        }

        // <klasses> ::= [ <klass> ]
        let nklasses = self.wire.read_array_len("classes block")?;
        let mut klasses = Vec::with_capacity(nklasses);
        let mut fixups = Vec::new();
        let mut klass_id_meta = None;
        for k in 0..nklasses {
            // <klass> ::= ( <klass_name>, <fields> )
            let npair = self.wire.read_array_len("class tuple")?;
            if npair != 2 {
                return Err(Error::WireFormat(format!(
                    "class tuple has {} elements, expected 2",
                    npair
                )));
            }
            let name = self.wire.read_string("class name")?;
            let static_klass = by_serial.get(name.as_str()).copied();
            if name == "__meta__" {
                klass_id_meta = Some(k);
            }

            // <fields> ::= [ <field> ]
            let nfields = self.wire.read_array_len("field list")?;
            let mut fields = Vec::with_capacity(nfields);
            for f in 0..nfields {
                let (field, pointer_to) = self.read_field_decl(f, &name, static_klass)?;
                if let Some(store_id) = pointer_to {
                    fixups.push(PointerFixup {
                        klass: k,
                        field: f,
                        store_id,
                    });
                }
                fields.push(field);
            }

            klasses.push(RtKlass {
                id: k,
                serial: name,
                fields,
                static_klass,
                lazy_bytes: None,
            });
        }

        let doc_klass = klass_id_meta.ok_or(Error::MissingMeta)?;
        Ok((klasses, fixups, doc_klass))
    }

    /// Parse one `<field>` map, bind it to its static counterpart if the
    /// enclosing class has one, and sanity-check the structural flags.
    fn read_field_decl(
        &mut self,
        f: usize,
        klass_name: &str,
        static_klass: Option<StaticKlass>,
    ) -> Result<(RtField, Option<usize>)> {
        let schema = self.schema;
        let mut name = None;
        let mut store_id = None;
        let mut is_pointer = false;
        let mut is_slice = false;
        let mut is_self_pointer = false;
        let mut is_collection = false;

        // <field> ::= { <field_type> : <field_val> }
        let nitems = self.wire.read_map_len("field map")?;
        for _ in 0..nitems {
            let key = self.wire.read_u8("field map key")?;
            match key {
                0 => name = Some(self.wire.read_string("field name")?),
                1 => {
                    store_id = Some(self.wire.read_u32("pointer store id")? as usize);
                    is_pointer = true;
                }
                2 => {
                    self.wire.read_nil("slice flag")?;
                    is_slice = true;
                }
                3 => {
                    self.wire.read_nil("self-pointer flag")?;
                    is_self_pointer = true;
                }
                4 => {
                    self.wire.read_nil("collection flag")?;
                    is_collection = true;
                }
                other => {
                    return Err(Error::WireFormat(format!(
                        "unknown key {} in field map",
                        other
                    )))
                }
            }
        }
        let name = name.ok_or_else(|| {
            Error::WireFormat(format!(
                "field {} of class '{}' has no NAME entry",
                f + 1,
                klass_name
            ))
        })?;

        // Fields of a lazy class are lazy; otherwise look the field up by its
        // wire name and make sure the stream and the declaration agree on the
        // four structural flags.
        let static_field = static_klass.and_then(|sk| {
            let fields = match sk {
                StaticKlass::Meta => &schema.fields,
                StaticKlass::Ann(i) => &schema.klasses[i].fields,
            };
            fields.iter().position(|field| field.serial == name)
        });
        if let Some(sf) = static_field {
            let fields = match static_klass {
                Some(StaticKlass::Meta) => &schema.fields,
                Some(StaticKlass::Ann(i)) => &schema.klasses[i].fields,
                None => unreachable!("static field can only bind inside a bound class"),
            };
            let kind = &fields[sf].kind;
            check_flag(klass_name, &name, "IS_POINTER", is_pointer, kind.is_pointer())?;
            check_flag(klass_name, &name, "IS_SLICE", is_slice, kind.is_slice())?;
            check_flag(
                klass_name,
                &name,
                "IS_SELF_POINTER",
                is_self_pointer,
                kind.is_self_pointer(),
            )?;
            check_flag(
                klass_name,
                &name,
                "IS_COLLECTION",
                is_collection,
                kind.is_collection(),
            )?;
        }

        let field = RtField {
            id: f,
            serial: name,
            is_pointer,
            is_slice,
            is_self_pointer,
            is_collection,
            static_field,
            store_id: None,
        };
        Ok((field, if is_pointer { store_id } else { None }))
    }

    /// Parse the stores block. Matched stores are checked for class agreement
    /// and resized immediately so indices stay valid for the rest of the
    /// decode.
    fn read_stores(&mut self, doc: &mut D, klasses: &[RtKlass]) -> Result<Vec<RtStore>> {
        let schema = self.schema;
        // <stores> ::= [ <store> ]
        let nstores = self.wire.read_array_len("stores block")?;
        let mut stores = Vec::with_capacity(nstores);
        for n in 0..nstores {
            // <store> ::= ( <store_name>, <klass_id>, <store_nelem> )
            let ntriple = self.wire.read_array_len("store tuple")?;
            if ntriple != 3 {
                return Err(Error::WireFormat(format!(
                    "store tuple has {} elements, expected 3",
                    ntriple
                )));
            }
            let name = self.wire.read_string("store name")?;
            let klass_id = self.wire.read_u32("store class id")? as usize;
            let nelem = self.wire.read_u32("store size")? as usize;
            if klass_id >= klasses.len() {
                return Err(Error::Bounds {
                    what: "class id",
                    value: klass_id as u64,
                    limit: klasses.len() as u64,
                });
            }

            let static_store = schema.stores.iter().position(|store| store.serial == name);
            if let Some(si) = static_store {
                // The stream store and the static store must agree on the
                // class they are storing.
                let klass_type = match klasses[klass_id].static_klass {
                    Some(StaticKlass::Ann(i)) => Some(schema.klasses[i].type_id),
                    Some(StaticKlass::Meta) => Some(schema.doc_type()),
                    None => None,
                };
                if klass_type != Some(schema.stores[si].ops.stored_type()) {
                    return Err(Error::SchemaMismatch(format!(
                        "store '{}' and its stream class '{}' disagree on the stored \
                         annotation type",
                        name, klasses[klass_id].serial
                    )));
                }
                schema.stores[si].ops.resize(doc, nelem);
            } else {
                debug!("store '{}' has no static counterpart", name);
            }

            stores.push(RtStore {
                id: n,
                serial: name,
                klass_id,
                nelem,
                static_store,
                lazy_bytes: None,
            });
        }
        Ok(stores)
    }

    /// Second header pass: point every recorded pointer field at its actual
    /// runtime store, verifying class agreement for fields the caller
    /// declared.
    fn bind_pointers(
        &self,
        klasses: &mut [RtKlass],
        stores: &[RtStore],
        fixups: &[PointerFixup],
    ) -> Result<()> {
        let schema = self.schema;
        for fix in fixups {
            if fix.store_id >= stores.len() {
                return Err(Error::Bounds {
                    what: "store id",
                    value: fix.store_id as u64,
                    limit: stores.len() as u64,
                });
            }
            let target = &stores[fix.store_id];
            let static_klass = klasses[fix.klass].static_klass;
            let static_field = klasses[fix.klass].fields[fix.field].static_field;
            if let Some(sf) = static_field {
                let fields = match static_klass {
                    Some(StaticKlass::Meta) => &schema.fields,
                    Some(StaticKlass::Ann(i)) => &schema.klasses[i].fields,
                    None => {
                        return Err(Error::Internal(
                            "bound field inside an unbound class".to_string(),
                        ))
                    }
                };
                let field = &fields[sf];
                let declared = match field.kind {
                    FieldKind::Pointer { target, .. } => target,
                    _ => {
                        return Err(Error::Internal(
                            "pointer flag on a non-pointer declaration".to_string(),
                        ))
                    }
                };
                let stored = match target.static_store {
                    Some(si) => schema.stores[si].ops.stored_type(),
                    None => {
                        return Err(Error::SchemaMismatch(format!(
                            "field '{}' of class '{}' points into store '{}', which is not \
                             declared",
                            field.name, klasses[fix.klass].serial, target.serial
                        )))
                    }
                };
                if declared != stored {
                    return Err(Error::SchemaMismatch(format!(
                        "field '{}' of class '{}' does not point at the class stored by \
                         store '{}'",
                        field.name, klasses[fix.klass].serial, target.serial
                    )));
                }
            }
            klasses[fix.klass].fields[fix.field].store_id = Some(fix.store_id);
        }
        Ok(())
    }

    fn read_nbytes(&mut self, step: &'static str) -> Result<usize> {
        // <instances_nbytes> ::= LONG
        let nbytes = self.wire.read_u64(step)?;
        if nbytes > MAX_GROUP_SIZE {
            return Err(Error::Bounds {
                what: "group byte length",
                value: nbytes,
                limit: MAX_GROUP_SIZE,
            });
        }
        Ok(nbytes as usize)
    }

    /// Read the document instance. When the caller declared no document
    /// fields at all, the whole instance is preserved verbatim on the runtime
    /// document class instead of being parsed.
    fn read_doc_instance(&mut self, doc: &mut D, rt: &mut RtManager) -> Result<()> {
        let schema = self.schema;
        // <doc_instance> ::= <instances_nbytes> <instance>
        let nbytes = self.read_nbytes("document instance size")?;
        if !schema.has_fields() {
            debug!("document class declares no fields, preserving {} bytes", nbytes);
            let raw = self.wire.read_raw(nbytes, "lazy document instance")?.to_vec();
            let doc_klass = rt.doc_klass;
            rt.klasses[doc_klass].lazy_bytes = Some(raw);
            return Ok(());
        }

        let doc_klass = rt.doc_klass;
        let slab = self.read_instance(
            &mut *doc,
            &rt.klasses[doc_klass].fields,
            &schema.fields,
            &rt.stores,
            None,
        )?;
        if let Some(slab) = slab {
            *doc.lazy_slot() = Some(slab);
        }
        Ok(())
    }

    /// Read one instance group per store, in store order. Lazy stores are
    /// preserved verbatim; for the rest each instance map is parsed in index
    /// order.
    fn read_store_groups(&mut self, doc: &mut D, rt: &mut RtManager) -> Result<()> {
        let schema = self.schema;
        // <instances_groups> ::= <instances_group>*
        for i in 0..rt.stores.len() {
            // <instances_group> ::= <instances_nbytes> <instances>
            let nbytes = self.read_nbytes("store group size")?;
            let static_store = match rt.stores[i].static_store {
                None => {
                    debug!(
                        "store '{}' is lazy, preserving {} bytes",
                        rt.stores[i].serial, nbytes
                    );
                    let raw = self.wire.read_raw(nbytes, "lazy store group")?.to_vec();
                    rt.stores[i].lazy_bytes = Some(raw);
                    continue;
                }
                Some(si) => si,
            };
            let klass_id = rt.stores[i].klass_id;
            let nelem = rt.stores[i].nelem;
            let ops = schema.stores[static_store].ops.as_ref();
            let static_fields: &[FieldSchema] = match rt.klasses[klass_id].static_klass {
                Some(StaticKlass::Ann(j)) => &schema.klasses[j].fields,
                Some(StaticKlass::Meta) => &schema.fields,
                None => {
                    return Err(Error::Internal(
                        "non-lazy store holds a lazy class".to_string(),
                    ))
                }
            };

            // <instances> ::= [ <instance> ]
            let ninstances = self.wire.read_array_len("store instances")?;
            for o in 0..ninstances {
                if o >= nelem {
                    return Err(Error::Bounds {
                        what: "instance index",
                        value: o as u64,
                        limit: nelem as u64,
                    });
                }
                let slab = {
                    let target = ops.ann_mut(doc, o).ok_or_else(|| {
                        Error::Internal("store was not resized before its instances".to_string())
                    })?;
                    self.read_instance(
                        target,
                        &rt.klasses[klass_id].fields,
                        static_fields,
                        &rt.stores,
                        Some(nelem),
                    )?
                };
                if let Some(slab) = slab {
                    ops.attach_lazy(doc, o, slab);
                }
            }
        }
        Ok(())
    }

    /// Parse one `<instance>` map onto `target`. Lazy and read-only fields
    /// are re-packed into a slab; returns the slab if anything landed in it.
    fn read_instance(
        &mut self,
        target: &mut dyn Any,
        rt_fields: &[RtField],
        static_fields: &[FieldSchema],
        stores: &[RtStore],
        current_nelem: Option<usize>,
    ) -> Result<Option<LazySlab>> {
        // <instance> ::= { <field_id> : <obj_val> }
        let nitems = self.wire.read_map_len("instance map")?;
        let mut lazy = Packer::new();
        let mut lazy_nelem = 0;
        for _ in 0..nitems {
            let field_id = self.wire.read_u32("field id")? as usize;
            let field = rt_fields.get(field_id).ok_or(Error::Bounds {
                what: "field id",
                value: field_id as u64,
                limit: rt_fields.len() as u64,
            })?;

            match field.static_field {
                None => {
                    // Unknown field: buffer the raw value for re-emission.
                    let mark = self.wire.pos();
                    self.wire.skip_value("lazy field value")?;
                    lazy.pack_uint(field_id as u64);
                    lazy.pack_raw(self.wire.captured(mark));
                    lazy_nelem += 1;
                }
                Some(sf) => {
                    let static_field = &static_fields[sf];
                    let mark = self.wire.pos();
                    let value =
                        self.read_field_value(field, static_field, stores, current_nelem)?;
                    static_field.set_value(target, value)?;
                    if static_field.mode == FieldMode::ReadOnly {
                        lazy.pack_uint(field_id as u64);
                        lazy.pack_raw(self.wire.captured(mark));
                        lazy_nelem += 1;
                    }
                }
            }
        }
        if lazy_nelem == 0 {
            Ok(None)
        } else {
            Ok(Some(LazySlab {
                bytes: lazy.into_vec(),
                nelem: lazy_nelem,
            }))
        }
    }

    /// Read one field value, dispatched on the field's kind. Pointer indexes
    /// are checked against the element count of the store they resolve in:
    /// the back-filled target store, or the current store for self-pointers.
    fn read_field_value(
        &mut self,
        field: &RtField,
        static_field: &FieldSchema,
        stores: &[RtStore],
        current_nelem: Option<usize>,
    ) -> Result<FieldValue> {
        if field.is_pointer || field.is_self_pointer {
            let nelem = if field.is_self_pointer {
                current_nelem.ok_or_else(|| {
                    Error::SchemaMismatch(format!(
                        "self-pointer field '{}' on the document itself",
                        field.serial
                    ))
                })?
            } else {
                let store_id = field.store_id.ok_or_else(|| {
                    Error::Internal("pointer field was never back-filled".to_string())
                })?;
                stores[store_id].nelem
            };
            if field.is_slice {
                self.read_pointer_slice(nelem)
            } else if field.is_collection {
                self.read_pointer_collection(nelem)
            } else {
                Ok(FieldValue::Pointer(self.read_pointer_index(nelem)?))
            }
        } else {
            match static_field.kind {
                FieldKind::ByteSlice => self.read_byte_slice(),
                FieldKind::Primitive(primitive) => self.read_primitive(primitive),
                _ => Err(Error::Internal(
                    "declaration flags disagree with stream flags".to_string(),
                )),
            }
        }
    }

    fn read_pointer_index(&mut self, nelem: usize) -> Result<usize> {
        let index = self.wire.read_u32("pointer index")? as usize;
        if index >= nelem {
            return Err(Error::Bounds {
                what: "pointer index",
                value: index as u64,
                limit: nelem as u64,
            });
        }
        Ok(index)
    }

    fn read_pointer_slice(&mut self, nelem: usize) -> Result<FieldValue> {
        let npair = self.wire.read_array_len("pointer slice")?;
        if npair != 2 {
            return Err(Error::WireFormat(format!(
                "pointer slice has {} elements, expected 2",
                npair
            )));
        }
        let start = self.wire.read_u32("pointer slice start")? as usize;
        let len = self.wire.read_u32("pointer slice length")? as usize;
        if len == 0 {
            return Err(Error::WireFormat(
                "pointer slice length must be at least 1".to_string(),
            ));
        }
        // Pointer slices are [inclusive, inclusive]: the writer emits
        // len = stop - start + 1.
        let stop = start.checked_add(len - 1).ok_or_else(|| {
            Error::WireFormat("pointer slice range overflows".to_string())
        })?;
        if start >= nelem || stop >= nelem {
            return Err(Error::Bounds {
                what: "pointer slice stop",
                value: stop as u64,
                limit: nelem as u64,
            });
        }
        Ok(FieldValue::PointerSlice(Slice::new(start, stop)))
    }

    fn read_pointer_collection(&mut self, nelem: usize) -> Result<FieldValue> {
        let nitems = self.wire.read_array_len("pointer collection")?;
        let mut indexes = Vec::with_capacity(nitems.min(4096));
        for _ in 0..nitems {
            indexes.push(self.read_pointer_index(nelem)?);
        }
        Ok(FieldValue::Pointers(indexes))
    }

    fn read_byte_slice(&mut self) -> Result<FieldValue> {
        let npair = self.wire.read_array_len("byte slice")?;
        if npair != 2 {
            return Err(Error::WireFormat(format!(
                "byte slice has {} elements, expected 2",
                npair
            )));
        }
        let start = self.wire.read_u64("byte slice start")?;
        let len = self.wire.read_u64("byte slice length")?;
        let stop = start
            .checked_add(len)
            .ok_or_else(|| Error::WireFormat("byte slice range overflows".to_string()))?;
        Ok(FieldValue::ByteSlice(ByteSlice::new(start, stop)))
    }

    fn read_primitive(&mut self, primitive: Primitive) -> Result<FieldValue> {
        Ok(match primitive {
            Primitive::Bool => FieldValue::Bool(self.wire.read_bool("boolean field")?),
            Primitive::Str => FieldValue::Str(self.wire.read_string("string field")?),
            Primitive::F32 => FieldValue::F32(self.wire.read_f32("f32 field")?),
            Primitive::F64 => FieldValue::F64(self.wire.read_f64("f64 field")?),
            _ => FieldValue::Int(self.wire.read_integer("integer field")?),
        })
    }
}

fn check_flag(
    klass: &str,
    field: &str,
    flag: &'static str,
    stream: bool,
    declared: bool,
) -> Result<()> {
    if stream != declared {
        return Err(Error::SchemaMismatch(format!(
            "field '{}' of class '{}' has {} as {} on the stream, but {} in the declaration",
            field, klass, flag, stream, declared
        )));
    }
    Ok(())
}

impl<'a, D: Doc> Iterator for Reader<'a, D> {
    type Item = Result<D>;

    fn next(&mut self) -> Option<Result<D>> {
        match self.read_next() {
            Ok(Some(doc)) => Some(Ok(doc)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
