//! Compact positional binary adapter.
//!
//! Fields are written in visit order with no names or tags, so encoding is
//! deterministic byte for byte. Fixed layout at the front of every message:
//! kind code as a little-endian i64, then the function name as a u64 length
//! prefix plus UTF-8 bytes. Argument tuples carry a u64 byte-length prefix so
//! a reader can step over them without knowing the argument types, which is
//! what [`BinaryAdapter::get_bound_result`] relies on.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::adapter::SerialAdapter;
use crate::envelope::RpcKind;
use crate::error::RpcError;
use crate::visit::{MapShape, Serializable, TupleShape, Visit, Visitor};

#[derive(Debug, Clone, Copy)]
pub struct BinaryAdapter;

// kind (8) + name length (8)
const HEADER_LEN: usize = 16;

fn name_len(obj: &Bytes) -> usize {
    u64::from_le_bytes(obj[8..16].try_into().unwrap()) as usize
}

impl SerialAdapter for BinaryAdapter {
    type SerialValue = Bytes;
    type Serializer = BinaryWriter;
    type Deserializer = BinaryReader;

    fn serializer() -> BinaryWriter {
        BinaryWriter { buf: BytesMut::new() }
    }

    fn finish(ser: BinaryWriter) -> Result<Bytes, RpcError> {
        Ok(ser.buf.freeze())
    }

    fn deserializer(obj: &Bytes) -> BinaryReader {
        BinaryReader { buf: obj.clone() }
    }

    fn from_bytes(bytes: &[u8]) -> Option<Bytes> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let code = i64::from_le_bytes(bytes[0..8].try_into().ok()?);
        RpcKind::from_code(code).ok()?;
        let len = u64::from_le_bytes(bytes[8..16].try_into().ok()?) as usize;
        let name = bytes.get(HEADER_LEN..HEADER_LEN + len)?;
        std::str::from_utf8(name).ok()?;
        Some(Bytes::copy_from_slice(bytes))
    }

    fn to_bytes(obj: &Bytes) -> Result<Vec<u8>, RpcError> {
        Ok(obj.to_vec())
    }

    fn get_func_name(obj: &Bytes) -> Result<String, RpcError> {
        let name = &obj[HEADER_LEN..HEADER_LEN + name_len(obj)];
        String::from_utf8(name.to_vec())
            .map_err(|_| RpcError::Deserialization("function name is not utf-8".into()))
    }

    fn get_kind(obj: &Bytes) -> Result<RpcKind, RpcError> {
        RpcKind::from_code(i64::from_le_bytes(obj[0..8].try_into().unwrap()))
    }

    fn has_bound_args(obj: &Bytes) -> Result<bool, RpcError> {
        let flag = obj
            .get(HEADER_LEN + name_len(obj))
            .copied()
            .ok_or_else(|| RpcError::Deserialization("truncated message".into()))?;
        Ok(flag != 0)
    }

    /// Steps over the fixed header, the bind flag, and the length-prefixed
    /// rebound argument block, then reads the trailing result.
    fn get_bound_result<R: Visit + Default>(obj: &Bytes) -> Result<R, RpcError> {
        let args_at = HEADER_LEN + name_len(obj) + 1;
        let args_len = obj
            .get(args_at..args_at + 8)
            .map(|b| u64::from_le_bytes(b.try_into().unwrap()) as usize)
            .ok_or_else(|| RpcError::Deserialization("truncated message".into()))?;
        let result_at = args_at + 8 + args_len;
        if result_at > obj.len() {
            return Err(RpcError::Deserialization("truncated message".into()));
        }
        let mut result = R::default();
        if !R::IS_UNIT {
            let mut vis = BinaryReader { buf: obj.slice(result_at..) };
            result.visit("", &mut vis)?;
        }
        Ok(result)
    }
}

/// Appends values in visit order. Keys are discarded.
pub struct BinaryWriter {
    buf: BytesMut,
}

impl Visitor for BinaryWriter {
    fn as_bool(&mut self, _key: &str, val: &mut bool) -> Result<(), RpcError> {
        self.buf.put_u8(*val as u8);
        Ok(())
    }

    fn as_int(&mut self, _key: &str, val: &mut i64) -> Result<(), RpcError> {
        self.buf.put_i64_le(*val);
        Ok(())
    }

    fn as_uint(&mut self, _key: &str, val: &mut u64) -> Result<(), RpcError> {
        self.buf.put_u64_le(*val);
        Ok(())
    }

    fn as_float(&mut self, _key: &str, val: &mut f64) -> Result<(), RpcError> {
        self.buf.put_f64_le(*val);
        Ok(())
    }

    fn as_string(&mut self, _key: &str, val: &mut String) -> Result<(), RpcError> {
        self.buf.put_u64_le(val.len() as u64);
        self.buf.put_slice(val.as_bytes());
        Ok(())
    }

    fn as_array<T: Visit + Default>(
        &mut self,
        _key: &str,
        val: &mut Vec<T>,
    ) -> Result<(), RpcError> {
        self.buf.put_u64_le(val.len() as u64);
        for item in val.iter_mut() {
            item.visit("", self)?;
        }
        Ok(())
    }

    fn as_array_sized<T: Visit + Default, const N: usize>(
        &mut self,
        _key: &str,
        val: &mut [T; N],
    ) -> Result<(), RpcError> {
        self.buf.put_u64_le(N as u64);
        for item in val.iter_mut() {
            item.visit("", self)?;
        }
        Ok(())
    }

    fn as_map<M: MapShape>(&mut self, _key: &str, val: &mut M) -> Result<(), RpcError> {
        let pairs = val.to_pairs();
        self.buf.put_u64_le(pairs.len() as u64);
        for (mut k, mut v) in pairs {
            k.visit("", self)?;
            v.visit("", self)?;
        }
        Ok(())
    }

    fn as_multimap<M: MapShape>(&mut self, key: &str, val: &mut M) -> Result<(), RpcError> {
        self.as_map(key, val)
    }

    fn as_optional<T: Visit + Default>(
        &mut self,
        _key: &str,
        val: &mut Option<T>,
    ) -> Result<(), RpcError> {
        match val {
            Some(inner) => {
                self.buf.put_u8(1);
                inner.visit("", self)
            }
            None => {
                self.buf.put_u8(0);
                Ok(())
            }
        }
    }

    fn as_tuple<T: TupleShape>(&mut self, _key: &str, val: &mut T) -> Result<(), RpcError> {
        let saved = std::mem::take(&mut self.buf);
        val.visit_items(self)?;
        let inner = std::mem::replace(&mut self.buf, saved);
        self.buf.put_u64_le(inner.len() as u64);
        self.buf.extend_from_slice(&inner);
        Ok(())
    }

    fn as_object<T: Serializable>(&mut self, _key: &str, val: &mut T) -> Result<(), RpcError> {
        val.serialize_fields(self)
    }
}

/// Consumes values in visit order with bounds checks on every read.
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    fn need(&self, n: usize) -> Result<(), RpcError> {
        if self.buf.remaining() < n {
            Err(RpcError::Deserialization("truncated message".into()))
        } else {
            Ok(())
        }
    }

    fn take_u64(&mut self) -> Result<u64, RpcError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }
}

impl Visitor for BinaryReader {
    fn as_bool(&mut self, _key: &str, val: &mut bool) -> Result<(), RpcError> {
        self.need(1)?;
        *val = self.buf.get_u8() != 0;
        Ok(())
    }

    fn as_int(&mut self, _key: &str, val: &mut i64) -> Result<(), RpcError> {
        self.need(8)?;
        *val = self.buf.get_i64_le();
        Ok(())
    }

    fn as_uint(&mut self, _key: &str, val: &mut u64) -> Result<(), RpcError> {
        *val = self.take_u64()?;
        Ok(())
    }

    fn as_float(&mut self, _key: &str, val: &mut f64) -> Result<(), RpcError> {
        self.need(8)?;
        *val = self.buf.get_f64_le();
        Ok(())
    }

    fn as_string(&mut self, _key: &str, val: &mut String) -> Result<(), RpcError> {
        let len = self.take_u64()? as usize;
        self.need(len)?;
        let raw = self.buf.split_to(len);
        *val = String::from_utf8(raw.to_vec())
            .map_err(|_| RpcError::Deserialization("string is not utf-8".into()))?;
        Ok(())
    }

    fn as_array<T: Visit + Default>(
        &mut self,
        _key: &str,
        val: &mut Vec<T>,
    ) -> Result<(), RpcError> {
        let count = self.take_u64()? as usize;
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let mut item = T::default();
            item.visit("", self)?;
            out.push(item);
        }
        *val = out;
        Ok(())
    }

    fn as_array_sized<T: Visit + Default, const N: usize>(
        &mut self,
        _key: &str,
        val: &mut [T; N],
    ) -> Result<(), RpcError> {
        let count = self.take_u64()? as usize;
        if count != N {
            return Err(RpcError::SignatureMismatch(format!(
                "expected an array of length {N}, got {count}"
            )));
        }
        for slot in val.iter_mut() {
            slot.visit("", self)?;
        }
        Ok(())
    }

    fn as_map<M: MapShape>(&mut self, _key: &str, val: &mut M) -> Result<(), RpcError> {
        let count = self.take_u64()? as usize;
        let mut out = M::default();
        for _ in 0..count {
            let mut k = M::Key::default();
            let mut v = M::Val::default();
            k.visit("", self)?;
            v.visit("", self)?;
            out.insert_pair(k, v);
        }
        *val = out;
        Ok(())
    }

    fn as_multimap<M: MapShape>(&mut self, key: &str, val: &mut M) -> Result<(), RpcError> {
        self.as_map(key, val)
    }

    fn as_optional<T: Visit + Default>(
        &mut self,
        _key: &str,
        val: &mut Option<T>,
    ) -> Result<(), RpcError> {
        self.need(1)?;
        if self.buf.get_u8() == 0 {
            *val = None;
        } else {
            let mut inner = T::default();
            inner.visit("", self)?;
            *val = Some(inner);
        }
        Ok(())
    }

    fn as_tuple<T: TupleShape>(&mut self, _key: &str, val: &mut T) -> Result<(), RpcError> {
        let len = self.take_u64()? as usize;
        self.need(len)?;
        val.visit_items(self)
    }

    fn as_object<T: Serializable>(&mut self, _key: &str, val: &mut T) -> Result<(), RpcError> {
        val.serialize_fields(self)
    }
}
