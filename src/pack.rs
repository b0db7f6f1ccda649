//! In-memory MessagePack packing onto an owned byte buffer.
//!
//! Always emits the shortest form for a value. The reader side accepts any
//! width, but the slabs this packer builds must be byte-stable so that
//! preserved data re-emits exactly once per element.

use crate::marker::Marker;

#[derive(Clone, Debug, Default)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    pub fn new() -> Packer {
        Packer { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Packer {
        Packer {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn pack_nil(&mut self) {
        self.buf.push(Marker::Null.into());
    }

    pub fn pack_bool(&mut self, v: bool) {
        let marker = if v { Marker::True } else { Marker::False };
        self.buf.push(marker.into());
    }

    pub fn pack_uint(&mut self, v: u64) {
        if v < 0x80 {
            self.buf.push(Marker::PosFixInt(v as u8).into());
        } else if v <= u8::MAX as u64 {
            self.buf.push(Marker::UInt8.into());
            self.buf.push(v as u8);
        } else if v <= u16::MAX as u64 {
            self.buf.push(Marker::UInt16.into());
            self.buf.extend_from_slice(&(v as u16).to_be_bytes());
        } else if v <= u32::MAX as u64 {
            self.buf.push(Marker::UInt32.into());
            self.buf.extend_from_slice(&(v as u32).to_be_bytes());
        } else {
            self.buf.push(Marker::UInt64.into());
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    pub fn pack_int(&mut self, v: i64) {
        if v >= 0 {
            self.pack_uint(v as u64);
        } else if v >= -32 {
            self.buf.push(Marker::NegFixInt(v as i8).into());
        } else if v >= i8::MIN as i64 {
            self.buf.push(Marker::Int8.into());
            self.buf.push(v as i8 as u8);
        } else if v >= i16::MIN as i64 {
            self.buf.push(Marker::Int16.into());
            self.buf.extend_from_slice(&(v as i16).to_be_bytes());
        } else if v >= i32::MIN as i64 {
            self.buf.push(Marker::Int32.into());
            self.buf.extend_from_slice(&(v as i32).to_be_bytes());
        } else {
            self.buf.push(Marker::Int64.into());
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    pub fn pack_f32(&mut self, v: f32) {
        self.buf.push(Marker::F32.into());
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    pub fn pack_f64(&mut self, v: f64) {
        self.buf.push(Marker::F64.into());
        self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
    }

    pub fn pack_str(&mut self, v: &str) {
        let len = v.len();
        if len < 32 {
            self.buf.push(Marker::FixStr(len as u8).into());
        } else if len <= u8::MAX as usize {
            self.buf.push(Marker::Str8.into());
            self.buf.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.push(Marker::Str16.into());
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(Marker::Str32.into());
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(v.as_bytes());
    }

    pub fn pack_bin(&mut self, v: &[u8]) {
        let len = v.len();
        if len <= u8::MAX as usize {
            self.buf.push(Marker::Bin8.into());
            self.buf.push(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.push(Marker::Bin16.into());
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(Marker::Bin32.into());
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(v);
    }

    pub fn pack_array_len(&mut self, len: usize) {
        if len < 16 {
            self.buf.push(Marker::FixArray(len as u8).into());
        } else if len <= u16::MAX as usize {
            self.buf.push(Marker::Array16.into());
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(Marker::Array32.into());
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    pub fn pack_map_len(&mut self, len: usize) {
        if len < 16 {
            self.buf.push(Marker::FixMap(len as u8).into());
        } else if len <= u16::MAX as usize {
            self.buf.push(Marker::Map16.into());
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(Marker::Map32.into());
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    /// Append already-packed bytes verbatim.
    pub fn pack_raw(&mut self, raw: &[u8]) {
        self.buf.extend_from_slice(raw);
    }
}
