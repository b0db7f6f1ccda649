//! Cursor-style reads of MessagePack primitives off a byte slice.
//!
//! The reader tracks its byte offset directly, so the exact byte range a
//! value consumed is always recoverable: take [`WireReader::pos`] before the
//! read and hand it to [`WireReader::captured`] after. Lazy preservation is
//! built on that capture.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::integer::Integer;
use crate::marker::Marker;
use crate::MAX_DEPTH;

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> WireReader<'a> {
        WireReader { buf, pos: 0 }
    }

    /// Current byte offset into the input.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// The bytes consumed since `mark`, which must be an offset previously
    /// returned by [`WireReader::pos`].
    pub fn captured(&self, mark: usize) -> &'a [u8] {
        &self.buf[mark..self.pos]
    }

    fn take(&mut self, n: usize, step: &'static str) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(Error::TruncatedFrame { step });
        }
        let data = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(data)
    }

    fn read_marker(&mut self, step: &'static str) -> Result<Marker> {
        Ok(Marker::from_u8(self.take(1, step)?[0]))
    }

    /// Read `n` bytes verbatim. Used for the opaque slabs of lazy stores and
    /// field-less documents.
    pub fn read_raw(&mut self, n: usize, step: &'static str) -> Result<&'a [u8]> {
        self.take(n, step)
    }

    /// Read any integer at its natural width.
    pub fn read_integer(&mut self, step: &'static str) -> Result<Integer> {
        let marker = self.read_marker(step)?;
        Ok(match marker {
            Marker::PosFixInt(v) => Integer::from(v),
            Marker::NegFixInt(v) => Integer::from(v),
            Marker::UInt8 => Integer::from(self.take(1, step)?[0]),
            Marker::UInt16 => Integer::from(BigEndian::read_u16(self.take(2, step)?)),
            Marker::UInt32 => Integer::from(BigEndian::read_u32(self.take(4, step)?)),
            Marker::UInt64 => Integer::from(BigEndian::read_u64(self.take(8, step)?)),
            Marker::Int8 => Integer::from(self.take(1, step)?[0] as i8),
            Marker::Int16 => Integer::from(BigEndian::read_i16(self.take(2, step)?)),
            Marker::Int32 => Integer::from(BigEndian::read_i32(self.take(4, step)?)),
            Marker::Int64 => Integer::from(BigEndian::read_i64(self.take(8, step)?)),
            other => {
                return Err(Error::WireFormat(format!(
                    "expected an integer on step [{}], found marker {:?}",
                    step, other
                )))
            }
        })
    }

    pub fn read_u8(&mut self, step: &'static str) -> Result<u8> {
        let int = self.read_integer(step)?;
        int.to::<u8>().ok_or_else(|| {
            Error::WireFormat(format!("integer {} on step [{}] does not fit in u8", int, step))
        })
    }

    pub fn read_u32(&mut self, step: &'static str) -> Result<u32> {
        let int = self.read_integer(step)?;
        int.to::<u32>().ok_or_else(|| {
            Error::WireFormat(format!("integer {} on step [{}] does not fit in u32", int, step))
        })
    }

    pub fn read_u64(&mut self, step: &'static str) -> Result<u64> {
        let int = self.read_integer(step)?;
        int.as_u64().ok_or_else(|| {
            Error::WireFormat(format!("integer {} on step [{}] is negative", int, step))
        })
    }

    pub fn read_nil(&mut self, step: &'static str) -> Result<()> {
        match self.read_marker(step)? {
            Marker::Null => Ok(()),
            other => Err(Error::WireFormat(format!(
                "expected nil on step [{}], found marker {:?}",
                step, other
            ))),
        }
    }

    pub fn read_bool(&mut self, step: &'static str) -> Result<bool> {
        match self.read_marker(step)? {
            Marker::True => Ok(true),
            Marker::False => Ok(false),
            other => Err(Error::WireFormat(format!(
                "expected a boolean on step [{}], found marker {:?}",
                step, other
            ))),
        }
    }

    pub fn read_f32(&mut self, step: &'static str) -> Result<f32> {
        match self.read_marker(step)? {
            Marker::F32 => Ok(BigEndian::read_f32(self.take(4, step)?)),
            other => Err(Error::WireFormat(format!(
                "expected an f32 on step [{}], found marker {:?}",
                step, other
            ))),
        }
    }

    pub fn read_f64(&mut self, step: &'static str) -> Result<f64> {
        match self.read_marker(step)? {
            Marker::F64 => Ok(BigEndian::read_f64(self.take(8, step)?)),
            other => Err(Error::WireFormat(format!(
                "expected an f64 on step [{}], found marker {:?}",
                step, other
            ))),
        }
    }

    pub fn read_str(&mut self, step: &'static str) -> Result<&'a str> {
        let len = match self.read_marker(step)? {
            Marker::FixStr(len) => len as usize,
            Marker::Str8 => self.take(1, step)?[0] as usize,
            Marker::Str16 => BigEndian::read_u16(self.take(2, step)?) as usize,
            Marker::Str32 => BigEndian::read_u32(self.take(4, step)?) as usize,
            other => {
                return Err(Error::WireFormat(format!(
                    "expected a string on step [{}], found marker {:?}",
                    step, other
                )))
            }
        };
        std::str::from_utf8(self.take(len, step)?)
            .map_err(|_| Error::WireFormat(format!("string on step [{}] is not valid UTF-8", step)))
    }

    pub fn read_string(&mut self, step: &'static str) -> Result<String> {
        Ok(self.read_str(step)?.to_string())
    }

    pub fn read_array_len(&mut self, step: &'static str) -> Result<usize> {
        match self.read_marker(step)? {
            Marker::FixArray(len) => Ok(len as usize),
            Marker::Array16 => Ok(BigEndian::read_u16(self.take(2, step)?) as usize),
            Marker::Array32 => Ok(BigEndian::read_u32(self.take(4, step)?) as usize),
            other => Err(Error::WireFormat(format!(
                "expected an array on step [{}], found marker {:?}",
                step, other
            ))),
        }
    }

    pub fn read_map_len(&mut self, step: &'static str) -> Result<usize> {
        match self.read_marker(step)? {
            Marker::FixMap(len) => Ok(len as usize),
            Marker::Map16 => Ok(BigEndian::read_u16(self.take(2, step)?) as usize),
            Marker::Map32 => Ok(BigEndian::read_u32(self.take(4, step)?) as usize),
            other => Err(Error::WireFormat(format!(
                "expected a map on step [{}], found marker {:?}",
                step, other
            ))),
        }
    }

    /// Step over one value of any kind. Combined with [`WireReader::pos`] and
    /// [`WireReader::captured`] this is the opaque-value read used to buffer
    /// lazy fields.
    pub fn skip_value(&mut self, step: &'static str) -> Result<()> {
        self.skip_value_at(step, 0)
    }

    fn skip_value_at(&mut self, step: &'static str, depth: usize) -> Result<()> {
        if depth >= MAX_DEPTH {
            return Err(Error::WireFormat(format!(
                "value on step [{}] nests deeper than {} levels",
                step, MAX_DEPTH
            )));
        }
        match self.read_marker(step)? {
            Marker::PosFixInt(_)
            | Marker::NegFixInt(_)
            | Marker::Null
            | Marker::True
            | Marker::False => {}
            Marker::UInt8 | Marker::Int8 => {
                self.take(1, step)?;
            }
            Marker::UInt16 | Marker::Int16 => {
                self.take(2, step)?;
            }
            Marker::UInt32 | Marker::Int32 | Marker::F32 => {
                self.take(4, step)?;
            }
            Marker::UInt64 | Marker::Int64 | Marker::F64 => {
                self.take(8, step)?;
            }
            Marker::FixStr(len) => {
                self.take(len as usize, step)?;
            }
            Marker::Str8 | Marker::Bin8 => {
                let len = self.take(1, step)?[0] as usize;
                self.take(len, step)?;
            }
            Marker::Str16 | Marker::Bin16 => {
                let len = BigEndian::read_u16(self.take(2, step)?) as usize;
                self.take(len, step)?;
            }
            Marker::Str32 | Marker::Bin32 => {
                let len = BigEndian::read_u32(self.take(4, step)?) as usize;
                self.take(len, step)?;
            }
            Marker::FixArray(len) => {
                for _ in 0..len {
                    self.skip_value_at(step, depth + 1)?;
                }
            }
            Marker::Array16 => {
                let len = BigEndian::read_u16(self.take(2, step)?);
                for _ in 0..len {
                    self.skip_value_at(step, depth + 1)?;
                }
            }
            Marker::Array32 => {
                let len = BigEndian::read_u32(self.take(4, step)?);
                for _ in 0..len {
                    self.skip_value_at(step, depth + 1)?;
                }
            }
            Marker::FixMap(len) => {
                for _ in 0..(len as usize) * 2 {
                    self.skip_value_at(step, depth + 1)?;
                }
            }
            Marker::Map16 => {
                let len = BigEndian::read_u16(self.take(2, step)?);
                for _ in 0..(len as usize) * 2 {
                    self.skip_value_at(step, depth + 1)?;
                }
            }
            Marker::Map32 => {
                let len = BigEndian::read_u32(self.take(4, step)?);
                for _ in 0..(len as usize) * 2 {
                    self.skip_value_at(step, depth + 1)?;
                }
            }
            other => {
                // docrep never writes ext or reserved markers.
                return Err(Error::WireFormat(format!(
                    "unsupported marker {:?} on step [{}]",
                    other, step
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pack::Packer;

    #[test]
    fn integers_at_all_widths() {
        let mut p = Packer::new();
        p.pack_uint(5);
        p.pack_uint(200);
        p.pack_uint(70_000);
        p.pack_uint(u64::MAX);
        p.pack_int(-5);
        p.pack_int(-200);
        p.pack_int(i64::MIN);
        let buf = p.into_vec();
        let mut r = WireReader::new(&buf);
        assert_eq!(r.read_u64("t").unwrap(), 5);
        assert_eq!(r.read_u64("t").unwrap(), 200);
        assert_eq!(r.read_u64("t").unwrap(), 70_000);
        assert_eq!(r.read_u64("t").unwrap(), u64::MAX);
        assert_eq!(r.read_integer("t").unwrap().as_i64(), Some(-5));
        assert_eq!(r.read_integer("t").unwrap().as_i64(), Some(-200));
        assert_eq!(r.read_integer("t").unwrap().as_i64(), Some(i64::MIN));
        assert!(r.is_at_end());
    }

    #[test]
    fn truncated_input() {
        let buf = [0xcd, 0x01]; // UInt16 missing a byte
        let mut r = WireReader::new(&buf);
        assert_eq!(
            r.read_integer("half an int"),
            Err(Error::TruncatedFrame { step: "half an int" })
        );
    }

    #[test]
    fn strings() {
        let mut p = Packer::new();
        p.pack_str("hello");
        p.pack_str(&"x".repeat(40));
        let buf = p.into_vec();
        let mut r = WireReader::new(&buf);
        assert_eq!(r.read_str("t").unwrap(), "hello");
        assert_eq!(r.read_str("t").unwrap().len(), 40);
    }

    #[test]
    fn invalid_utf8_rejected() {
        let buf = [0xa2, 0xff, 0xfe]; // FixStr(2) with invalid bytes
        let mut r = WireReader::new(&buf);
        assert!(matches!(r.read_str("t"), Err(Error::WireFormat(_))));
    }

    #[test]
    fn wrong_kind_reports_marker() {
        let buf = [0xc0]; // nil
        let mut r = WireReader::new(&buf);
        let err = r.read_array_len("stores block").unwrap_err();
        match err {
            Error::WireFormat(msg) => assert!(msg.contains("stores block")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn skip_value_captures_exact_range() {
        let mut p = Packer::new();
        p.pack_array_len(2);
        p.pack_str("ab");
        p.pack_map_len(1);
        p.pack_uint(1);
        p.pack_bool(true);
        p.pack_uint(7); // trailing value, not part of the skip
        let buf = p.into_vec();
        let mut r = WireReader::new(&buf);
        let mark = r.pos();
        r.skip_value("t").unwrap();
        assert_eq!(r.captured(mark), &buf[..buf.len() - 1]);
        assert_eq!(r.read_u64("t").unwrap(), 7);
    }

    #[test]
    fn skip_depth_limit() {
        // MAX_DEPTH nested single-element arrays around a nil
        let mut buf = vec![0x91u8; crate::MAX_DEPTH];
        buf.push(0xc0);
        let mut r = WireReader::new(&buf);
        assert!(matches!(r.skip_value("t"), Err(Error::WireFormat(_))));
    }

    #[test]
    fn ext_markers_rejected() {
        let buf = [0xd4, 0x00, 0x00]; // FixExt1
        let mut r = WireReader::new(&buf);
        assert!(matches!(r.skip_value("t"), Err(Error::WireFormat(_))));
    }
}
