//! Shape-driven value walking, the seam between typed Rust values and an
//! adapter's serial representation.
//!
//! A [`Visitor`] is one direction of one format: an adapter supplies a writing
//! visitor and a reading visitor and both are driven through the same
//! [`Visit::visit`] call on the value. The shape (`as_bool`, `as_array`,
//! `as_tuple`, ...) is selected entirely at compile time by the value's static
//! type; adapters never inspect types at runtime.
//!
//! User-defined aggregates hook in through [`Serializable`], reached via
//! [`Visitor::as_object`]. That is the only extension point.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::error::RpcError;

/// One direction (write or read) of one serial format.
///
/// The `key` argument names the field when the surrounding context is an
/// aggregate with named fields; positional formats and positional contexts
/// (array elements, tuple items) receive `""` and may ignore it.
///
/// Reading visitors mutate the value in place and must reject wire values
/// whose dynamic shape does not match the requested static shape with
/// [`RpcError::SignatureMismatch`] wherever the format can tell.
pub trait Visitor: Sized {
    fn as_bool(&mut self, key: &str, val: &mut bool) -> Result<(), RpcError>;
    fn as_int(&mut self, key: &str, val: &mut i64) -> Result<(), RpcError>;
    fn as_uint(&mut self, key: &str, val: &mut u64) -> Result<(), RpcError>;
    fn as_float(&mut self, key: &str, val: &mut f64) -> Result<(), RpcError>;
    fn as_string(&mut self, key: &str, val: &mut String) -> Result<(), RpcError>;

    /// Resizable sequence.
    fn as_array<T: Visit + Default>(&mut self, key: &str, val: &mut Vec<T>)
        -> Result<(), RpcError>;

    /// Fixed-arity sequence; reading a sequence of any other length is a
    /// signature mismatch.
    fn as_array_sized<T: Visit + Default, const N: usize>(
        &mut self,
        key: &str,
        val: &mut [T; N],
    ) -> Result<(), RpcError>;

    /// Associative container with unique keys.
    fn as_map<M: MapShape>(&mut self, key: &str, val: &mut M) -> Result<(), RpcError>;

    /// Associative container preserving duplicate keys.
    fn as_multimap<M: MapShape>(&mut self, key: &str, val: &mut M) -> Result<(), RpcError>;

    fn as_optional<T: Visit + Default>(
        &mut self,
        key: &str,
        val: &mut Option<T>,
    ) -> Result<(), RpcError>;

    /// Heterogeneous fixed-arity product (tuples and pairs).
    fn as_tuple<T: TupleShape>(&mut self, key: &str, val: &mut T) -> Result<(), RpcError>;

    /// Fallback for user-defined aggregates.
    fn as_object<T: Serializable>(&mut self, key: &str, val: &mut T) -> Result<(), RpcError>;
}

/// A value with a statically known shape that a [`Visitor`] can walk.
pub trait Visit {
    /// True only for `()`: unit results are omitted from the wire entirely.
    const IS_UNIT: bool = false;

    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError>;
}

/// User-defined aggregate extension point.
///
/// Implementors list their fields once; the same method serves both
/// directions because the visitor mutates fields in place when reading.
/// Pair it with [`impl_visit!`] to make the type usable anywhere a
/// [`Visit`] bound appears.
pub trait Serializable: Default {
    fn serialize_fields<V: Visitor>(&mut self, vis: &mut V) -> Result<(), RpcError>;
}

/// Routes a [`Serializable`] aggregate through [`Visitor::as_object`].
#[macro_export]
macro_rules! impl_visit {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::visit::Visit for $ty {
                fn visit<V: $crate::visit::Visitor>(
                    &mut self,
                    key: &str,
                    vis: &mut V,
                ) -> Result<(), $crate::error::RpcError> {
                    vis.as_object(key, self)
                }
            }
        )+
    };
}

impl Visit for () {
    const IS_UNIT: bool = true;

    fn visit<V: Visitor>(&mut self, _key: &str, _vis: &mut V) -> Result<(), RpcError> {
        Ok(())
    }
}

impl Visit for bool {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        vis.as_bool(key, self)
    }
}

impl Visit for i64 {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        vis.as_int(key, self)
    }
}

impl Visit for u64 {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        vis.as_uint(key, self)
    }
}

impl Visit for f64 {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        vis.as_float(key, self)
    }
}

impl Visit for f32 {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        let mut wide = f64::from(*self);
        vis.as_float(key, &mut wide)?;
        *self = wide as f32;
        Ok(())
    }
}

impl Visit for String {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        vis.as_string(key, self)
    }
}

macro_rules! impl_visit_int {
    ($($ty:ty),+) => {
        $(
            impl Visit for $ty {
                fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
                    let mut wide = i64::from(*self);
                    vis.as_int(key, &mut wide)?;
                    *self = <$ty>::try_from(wide).map_err(|_| {
                        RpcError::SignatureMismatch(format!(
                            "integer {wide} does not fit in {}",
                            std::any::type_name::<$ty>()
                        ))
                    })?;
                    Ok(())
                }
            }
        )+
    };
}

macro_rules! impl_visit_uint {
    ($($ty:ty),+) => {
        $(
            impl Visit for $ty {
                fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
                    let mut wide = *self as u64;
                    vis.as_uint(key, &mut wide)?;
                    *self = <$ty>::try_from(wide).map_err(|_| {
                        RpcError::SignatureMismatch(format!(
                            "integer {wide} does not fit in {}",
                            std::any::type_name::<$ty>()
                        ))
                    })?;
                    Ok(())
                }
            }
        )+
    };
}

impl_visit_int!(i8, i16, i32);
impl_visit_uint!(u8, u16, u32, usize);

impl<T: Visit + Default> Visit for Vec<T> {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        vis.as_array(key, self)
    }
}

impl<T: Visit + Default, const N: usize> Visit for [T; N] {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        vis.as_array_sized(key, self)
    }
}

impl<T: Visit + Default> Visit for Option<T> {
    fn visit<V: Visitor>(&mut self, key: &str, vis: &mut V) -> Result<(), RpcError> {
        vis.as_optional(key, self)
    }
}

/// Uniform adapter-facing view of an associative container.
///
/// Serialization reads the container out as owned pairs; deserialization
/// rebuilds it pair by pair into a default-constructed container.
pub trait MapShape: Default {
    type Key: Visit + Default + Clone;
    type Val: Visit + Default + Clone;

    fn to_pairs(&self) -> Vec<(Self::Key, Self::Val)>;
    fn insert_pair(&mut self, key: Self::Key, val: Self::Val);
}

impl<K, V> MapShape for HashMap<K, V>
where
    K: Visit + Default + Clone + Eq + Hash,
    V: Visit + Default + Clone,
{
    type Key = K;
    type Val = V;

    fn to_pairs(&self) -> Vec<(K, V)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn insert_pair(&mut self, key: K, val: V) {
        self.insert(key, val);
    }
}

impl<K, V> MapShape for BTreeMap<K, V>
where
    K: Visit + Default + Clone + Ord,
    V: Visit + Default + Clone,
{
    type Key = K;
    type Val = V;

    fn to_pairs(&self) -> Vec<(K, V)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn insert_pair(&mut self, key: K, val: V) {
        self.insert(key, val);
    }
}

impl<K, V> Visit for HashMap<K, V>
where
    K: Visit + Default + Clone + Eq + Hash,
    V: Visit + Default + Clone,
{
    fn visit<Vis: Visitor>(&mut self, key: &str, vis: &mut Vis) -> Result<(), RpcError> {
        vis.as_map(key, self)
    }
}

impl<K, V> Visit for BTreeMap<K, V>
where
    K: Visit + Default + Clone + Ord,
    V: Visit + Default + Clone,
{
    fn visit<Vis: Visitor>(&mut self, key: &str, vis: &mut Vis) -> Result<(), RpcError> {
        vis.as_map(key, self)
    }
}

/// Associative container that keeps every inserted pair, duplicates included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiMap<K, V>(pub Vec<(K, V)>);

impl<K, V> MapShape for MultiMap<K, V>
where
    K: Visit + Default + Clone,
    V: Visit + Default + Clone,
{
    type Key = K;
    type Val = V;

    fn to_pairs(&self) -> Vec<(K, V)> {
        self.0.clone()
    }

    fn insert_pair(&mut self, key: K, val: V) {
        self.0.push((key, val));
    }
}

impl<K, V> Visit for MultiMap<K, V>
where
    K: Visit + Default + Clone,
    V: Visit + Default + Clone,
{
    fn visit<Vis: Visitor>(&mut self, key: &str, vis: &mut Vis) -> Result<(), RpcError> {
        vis.as_multimap(key, self)
    }
}

/// Ordered heterogeneous product: argument tuples and nested pairs.
pub trait TupleShape: Default {
    const ARITY: usize;

    /// Visits every item in order, each with an empty key.
    fn visit_items<V: Visitor>(&mut self, vis: &mut V) -> Result<(), RpcError>;
}

impl TupleShape for () {
    const ARITY: usize = 0;

    fn visit_items<V: Visitor>(&mut self, _vis: &mut V) -> Result<(), RpcError> {
        Ok(())
    }
}

macro_rules! impl_tuple_shape {
    ($arity:expr => $($ty:ident : $idx:tt),+) => {
        impl<$($ty: Visit + Default),+> TupleShape for ($($ty,)+) {
            const ARITY: usize = $arity;

            fn visit_items<Vis: Visitor>(&mut self, vis: &mut Vis) -> Result<(), RpcError> {
                $(self.$idx.visit("", vis)?;)+
                Ok(())
            }
        }

        impl<$($ty: Visit + Default),+> Visit for ($($ty,)+) {
            fn visit<Vis: Visitor>(&mut self, key: &str, vis: &mut Vis) -> Result<(), RpcError> {
                vis.as_tuple(key, self)
            }
        }
    };
}

impl_tuple_shape!(1 => T0: 0);
impl_tuple_shape!(2 => T0: 0, T1: 1);
impl_tuple_shape!(3 => T0: 0, T1: 1, T2: 2);
impl_tuple_shape!(4 => T0: 0, T1: 1, T2: 2, T3: 3);
impl_tuple_shape!(5 => T0: 0, T1: 1, T2: 2, T3: 3, T4: 4);
impl_tuple_shape!(6 => T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5);
impl_tuple_shape!(7 => T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6);
impl_tuple_shape!(8 => T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7);
impl_tuple_shape!(9 => T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8);
impl_tuple_shape!(10 => T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8, T9: 9);
