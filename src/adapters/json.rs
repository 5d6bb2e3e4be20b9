//! Self-describing tree adapter over [`serde_json::Value`].
//!
//! Messages are JSON objects keyed by the logical envelope fields (`type`,
//! `func_name`, `bind_args`, `args`, `result`, ...). Byte encoding and
//! decoding are delegated to serde_json; this module only shapes values.

use serde_json::{Map, Number, Value};

use crate::adapter::SerialAdapter;
use crate::envelope::RpcKind;
use crate::error::RpcError;
use crate::visit::{MapShape, Serializable, TupleShape, Visit, Visitor};

#[derive(Debug, Clone, Copy)]
pub struct JsonAdapter;

impl SerialAdapter for JsonAdapter {
    type SerialValue = Value;
    type Serializer = JsonWriter;
    type Deserializer = JsonReader;

    fn serializer() -> JsonWriter {
        JsonWriter::new()
    }

    fn finish(ser: JsonWriter) -> Result<Value, RpcError> {
        ser.into_value()
    }

    fn deserializer(obj: &Value) -> JsonReader {
        JsonReader::new(obj.clone())
    }

    fn from_bytes(bytes: &[u8]) -> Option<Value> {
        let value: Value = serde_json::from_slice(bytes).ok()?;
        let map = value.as_object()?;
        map.get("func_name")?.as_str()?;
        let code = map.get("type")?.as_i64()?;
        RpcKind::from_code(code).ok()?;
        Some(value)
    }

    fn to_bytes(obj: &Value) -> Result<Vec<u8>, RpcError> {
        serde_json::to_vec(obj).map_err(|err| RpcError::Serialization(err.to_string()))
    }

    fn get_func_name(obj: &Value) -> Result<String, RpcError> {
        obj.get("func_name")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| RpcError::Deserialization("missing field: func_name".into()))
    }

    fn get_kind(obj: &Value) -> Result<RpcKind, RpcError> {
        let code = obj
            .get("type")
            .and_then(Value::as_i64)
            .ok_or_else(|| RpcError::Deserialization("missing field: type".into()))?;
        RpcKind::from_code(code)
    }

    fn has_bound_args(obj: &Value) -> Result<bool, RpcError> {
        obj.get("bind_args")
            .and_then(Value::as_bool)
            .ok_or_else(|| RpcError::Deserialization("missing field: bind_args".into()))
    }
}

enum WriteCtx {
    Arr(Vec<Value>),
    /// A pending value slot: a scalar fills it directly, keyed fields turn
    /// it into an object.
    Node(Option<Value>),
}

/// Builds a [`Value`] tree from visitor calls.
pub struct JsonWriter {
    root: Map<String, Value>,
    stack: Vec<WriteCtx>,
}

impl JsonWriter {
    fn new() -> Self {
        Self { root: Map::new(), stack: Vec::new() }
    }

    fn into_value(self) -> Result<Value, RpcError> {
        if !self.stack.is_empty() {
            return Err(RpcError::Serialization("unclosed value context".into()));
        }
        Ok(Value::Object(self.root))
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), RpcError> {
        match self.stack.last_mut() {
            Some(WriteCtx::Arr(items)) => {
                items.push(value);
                Ok(())
            }
            Some(WriteCtx::Node(slot)) => {
                if key.is_empty() {
                    *slot = Some(value);
                } else {
                    match slot {
                        Some(Value::Object(map)) => {
                            map.insert(key.to_owned(), value);
                        }
                        None => {
                            let mut map = Map::new();
                            map.insert(key.to_owned(), value);
                            *slot = Some(Value::Object(map));
                        }
                        Some(_) => {
                            return Err(RpcError::Serialization(format!(
                                "cannot add field \"{key}\" to a non-object value"
                            )))
                        }
                    }
                }
                Ok(())
            }
            None => {
                if key.is_empty() {
                    return Err(RpcError::Serialization(
                        "top-level values must be keyed".into(),
                    ));
                }
                self.root.insert(key.to_owned(), value);
                Ok(())
            }
        }
    }

    fn pop_arr(&mut self) -> Vec<Value> {
        match self.stack.pop() {
            Some(WriteCtx::Arr(items)) => items,
            _ => unreachable!("array context imbalance"),
        }
    }

    fn pop_node(&mut self) -> Value {
        match self.stack.pop() {
            Some(WriteCtx::Node(slot)) => slot.unwrap_or(Value::Object(Map::new())),
            _ => unreachable!("node context imbalance"),
        }
    }
}

impl Visitor for JsonWriter {
    fn as_bool(&mut self, key: &str, val: &mut bool) -> Result<(), RpcError> {
        self.put(key, Value::Bool(*val))
    }

    fn as_int(&mut self, key: &str, val: &mut i64) -> Result<(), RpcError> {
        self.put(key, Value::Number(Number::from(*val)))
    }

    fn as_uint(&mut self, key: &str, val: &mut u64) -> Result<(), RpcError> {
        self.put(key, Value::Number(Number::from(*val)))
    }

    fn as_float(&mut self, key: &str, val: &mut f64) -> Result<(), RpcError> {
        let num = Number::from_f64(*val)
            .ok_or_else(|| RpcError::Serialization("non-finite float".into()))?;
        self.put(key, Value::Number(num))
    }

    fn as_string(&mut self, key: &str, val: &mut String) -> Result<(), RpcError> {
        self.put(key, Value::String(val.clone()))
    }

    fn as_array<T: Visit + Default>(
        &mut self,
        key: &str,
        val: &mut Vec<T>,
    ) -> Result<(), RpcError> {
        self.stack.push(WriteCtx::Arr(Vec::with_capacity(val.len())));
        for item in val.iter_mut() {
            item.visit("", self)?;
        }
        let items = self.pop_arr();
        self.put(key, Value::Array(items))
    }

    fn as_array_sized<T: Visit + Default, const N: usize>(
        &mut self,
        key: &str,
        val: &mut [T; N],
    ) -> Result<(), RpcError> {
        self.stack.push(WriteCtx::Arr(Vec::with_capacity(N)));
        for item in val.iter_mut() {
            item.visit("", self)?;
        }
        let items = self.pop_arr();
        self.put(key, Value::Array(items))
    }

    fn as_map<M: MapShape>(&mut self, key: &str, val: &mut M) -> Result<(), RpcError> {
        let pairs = val.to_pairs();
        self.stack.push(WriteCtx::Arr(Vec::with_capacity(pairs.len())));
        for (mut k, mut v) in pairs {
            self.stack.push(WriteCtx::Arr(Vec::with_capacity(2)));
            k.visit("", self)?;
            v.visit("", self)?;
            let pair = self.pop_arr();
            self.put("", Value::Array(pair))?;
        }
        let entries = self.pop_arr();
        self.put(key, Value::Array(entries))
    }

    fn as_multimap<M: MapShape>(&mut self, key: &str, val: &mut M) -> Result<(), RpcError> {
        self.as_map(key, val)
    }

    fn as_optional<T: Visit + Default>(
        &mut self,
        key: &str,
        val: &mut Option<T>,
    ) -> Result<(), RpcError> {
        match val {
            Some(inner) => inner.visit(key, self),
            None => self.put(key, Value::Null),
        }
    }

    fn as_tuple<T: TupleShape>(&mut self, key: &str, val: &mut T) -> Result<(), RpcError> {
        self.stack.push(WriteCtx::Arr(Vec::with_capacity(T::ARITY)));
        val.visit_items(self)?;
        let items = self.pop_arr();
        self.put(key, Value::Array(items))
    }

    fn as_object<T: Serializable>(&mut self, key: &str, val: &mut T) -> Result<(), RpcError> {
        self.stack.push(WriteCtx::Node(None));
        val.serialize_fields(self)?;
        let node = self.pop_node();
        self.put(key, node)
    }
}

enum ReadCtx {
    Node(Value),
    Seq(std::collections::VecDeque<Value>),
}

/// Walks a [`Value`] tree, validating that the dynamic JSON shape matches
/// the static shape being requested.
pub struct JsonReader {
    stack: Vec<ReadCtx>,
}

impl JsonReader {
    fn new(value: Value) -> Self {
        Self { stack: vec![ReadCtx::Node(value)] }
    }

    fn fetch(&mut self, key: &str) -> Result<Value, RpcError> {
        match self.stack.last_mut() {
            Some(ReadCtx::Seq(items)) => items
                .pop_front()
                .ok_or_else(|| RpcError::Deserialization("sequence exhausted".into())),
            Some(ReadCtx::Node(value)) => {
                if key.is_empty() {
                    Ok(value.clone())
                } else {
                    value
                        .as_object()
                        .ok_or_else(|| {
                            RpcError::SignatureMismatch("expected a JSON object".into())
                        })?
                        .get(key)
                        .cloned()
                        .ok_or_else(|| {
                            RpcError::Deserialization(format!("missing field: {key}"))
                        })
                }
            }
            None => Err(RpcError::Deserialization("empty read context".into())),
        }
    }

    fn fetch_array(&mut self, key: &str) -> Result<Vec<Value>, RpcError> {
        match self.fetch(key)? {
            Value::Array(items) => Ok(items),
            _ => Err(RpcError::SignatureMismatch("expected a JSON array".into())),
        }
    }

    fn read_item<T: Visit + Default>(&mut self, value: Value) -> Result<T, RpcError> {
        self.stack.push(ReadCtx::Node(value));
        let mut item = T::default();
        let result = item.visit("", self);
        self.stack.pop();
        result.map(|()| item)
    }
}

impl Visitor for JsonReader {
    fn as_bool(&mut self, key: &str, val: &mut bool) -> Result<(), RpcError> {
        *val = self
            .fetch(key)?
            .as_bool()
            .ok_or_else(|| RpcError::SignatureMismatch("expected a JSON boolean".into()))?;
        Ok(())
    }

    fn as_int(&mut self, key: &str, val: &mut i64) -> Result<(), RpcError> {
        *val = self
            .fetch(key)?
            .as_i64()
            .ok_or_else(|| RpcError::SignatureMismatch("expected a JSON integer".into()))?;
        Ok(())
    }

    fn as_uint(&mut self, key: &str, val: &mut u64) -> Result<(), RpcError> {
        *val = self
            .fetch(key)?
            .as_u64()
            .ok_or_else(|| {
                RpcError::SignatureMismatch("expected an unsigned JSON integer".into())
            })?;
        Ok(())
    }

    fn as_float(&mut self, key: &str, val: &mut f64) -> Result<(), RpcError> {
        *val = self
            .fetch(key)?
            .as_f64()
            .ok_or_else(|| RpcError::SignatureMismatch("expected a JSON number".into()))?;
        Ok(())
    }

    fn as_string(&mut self, key: &str, val: &mut String) -> Result<(), RpcError> {
        *val = self
            .fetch(key)?
            .as_str()
            .ok_or_else(|| RpcError::SignatureMismatch("expected a JSON string".into()))?
            .to_owned();
        Ok(())
    }

    fn as_array<T: Visit + Default>(
        &mut self,
        key: &str,
        val: &mut Vec<T>,
    ) -> Result<(), RpcError> {
        let items = self.fetch_array(key)?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.read_item(item)?);
        }
        *val = out;
        Ok(())
    }

    fn as_array_sized<T: Visit + Default, const N: usize>(
        &mut self,
        key: &str,
        val: &mut [T; N],
    ) -> Result<(), RpcError> {
        let items = self.fetch_array(key)?;
        if items.len() != N {
            return Err(RpcError::SignatureMismatch(format!(
                "expected an array of length {N}, got {}",
                items.len()
            )));
        }
        for (slot, item) in val.iter_mut().zip(items) {
            *slot = self.read_item(item)?;
        }
        Ok(())
    }

    fn as_map<M: MapShape>(&mut self, key: &str, val: &mut M) -> Result<(), RpcError> {
        let entries = self.fetch_array(key)?;
        let mut out = M::default();
        for entry in entries {
            let Value::Array(pair) = entry else {
                return Err(RpcError::SignatureMismatch(
                    "expected a [key, value] entry".into(),
                ));
            };
            let mut pair = std::collections::VecDeque::from(pair);
            if pair.len() != 2 {
                return Err(RpcError::SignatureMismatch(
                    "expected a [key, value] entry".into(),
                ));
            }
            let k = self.read_item(pair.pop_front().unwrap())?;
            let v = self.read_item(pair.pop_front().unwrap())?;
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
        key: &str,
        val: &mut Option<T>,
    ) -> Result<(), RpcError> {
        let node = self.fetch(key)?;
        if node.is_null() {
            *val = None;
        } else {
            *val = Some(self.read_item(node)?);
        }
        Ok(())
    }

    fn as_tuple<T: TupleShape>(&mut self, key: &str, val: &mut T) -> Result<(), RpcError> {
        let items = self.fetch_array(key)?;
        if items.len() != T::ARITY {
            return Err(RpcError::SignatureMismatch(format!(
                "expected {} arguments, got {}",
                T::ARITY,
                items.len()
            )));
        }
        self.stack.push(ReadCtx::Seq(items.into()));
        let result = val.visit_items(self);
        self.stack.pop();
        result
    }

    fn as_object<T: Serializable>(&mut self, key: &str, val: &mut T) -> Result<(), RpcError> {
        let node = self.fetch(key)?;
        self.stack.push(ReadCtx::Node(node));
        let result = val.serialize_fields(self);
        self.stack.pop();
        result
    }
}
