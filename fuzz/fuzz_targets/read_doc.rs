#![no_main]
use docrep::{
    Ann, AnnSchema, Doc, DocSchema, FieldSchema, LazySlab, Reader, RtManager, Store, StoreSchema,
};
use libfuzzer_sys::fuzz_target;

#[derive(Default)]
struct FuzzDoc {
    title: String,
    tokens: Store<FuzzToken>,
    rt: Option<RtManager>,
    lazy: Option<LazySlab>,
}

impl Doc for FuzzDoc {
    fn rt(&self) -> Option<&RtManager> {
        self.rt.as_ref()
    }
    fn rt_slot(&mut self) -> &mut Option<RtManager> {
        &mut self.rt
    }
    fn lazy(&self) -> Option<&LazySlab> {
        self.lazy.as_ref()
    }
    fn lazy_slot(&mut self) -> &mut Option<LazySlab> {
        &mut self.lazy
    }
}

#[derive(Default)]
struct FuzzToken {
    text: String,
    lazy: Option<LazySlab>,
}

impl Ann for FuzzToken {
    fn lazy(&self) -> Option<&LazySlab> {
        self.lazy.as_ref()
    }
    fn lazy_slot(&mut self) -> &mut Option<LazySlab> {
        &mut self.lazy
    }
}

fuzz_target!(|data: &[u8]| {
    let schema: DocSchema<FuzzDoc> = DocSchema::new("FuzzDoc")
        .field(FieldSchema::primitive::<FuzzDoc, String>("title", |d| {
            &mut d.title
        }))
        .klass(AnnSchema::new::<FuzzToken>("token", vec![
            FieldSchema::primitive::<FuzzToken, String>("text", |t| &mut t.text),
        ]))
        .store(StoreSchema::new::<FuzzToken>("tokens", |d| &mut d.tokens));
    let mut reader = Reader::new(data, &schema);
    while let Some(result) = reader.next() {
        if result.is_err() {
            break;
        }
    }
});
