use std::fmt::{
    self,
    Display,
};

use indexmap::IndexMap;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
    de::{
        MapAccess,
        SeqAccess,
        Visitor,
    },
};
use thiserror::Error;

/// An integer type for WAMP messages.
pub type Integer = i64;

/// A dictionary of key-value pairs.
///
/// Keys keep their insertion order, so a decoded dictionary encodes back to the same bytes.
pub type Dictionary = IndexMap<String, Value>;

/// A sequence of values.
pub type List = Vec<Value>;

/// The kind of a [`Value`], used for reporting type mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    UnsignedInteger,
    Float,
    String,
    List,
    Dictionary,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::UnsignedInteger => "unsigned integer",
            Self::Float => "float",
            Self::String => "string",
            Self::List => "list",
            Self::Dictionary => "dictionary",
        };
        f.write_str(name)
    }
}

/// A value for WAMP messages.
///
/// Integers that fit in [`Integer`] are always stored as [`Value::Integer`].
/// [`Value::UnsignedInteger`] only carries values above [`Integer::MAX`], and the two compare equal
/// when they hold the same number.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(Integer),
    UnsignedInteger(u64),
    Float(f64),
    String(String),
    List(List),
    Dictionary(Dictionary),
}

impl Value {
    /// The kind of value stored.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Integer(_) => ValueKind::Integer,
            Self::UnsignedInteger(_) => ValueKind::UnsignedInteger,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::List(_) => ValueKind::List,
            Self::Dictionary(_) => ValueKind::Dictionary,
        }
    }

    /// Checks if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value as a [`bool`].
    pub fn bool(&self) -> Option<bool> {
        match self {
            Self::Bool(val) => Some(*val),
            _ => None,
        }
    }

    /// The value as an [`Integer`].
    pub fn integer(&self) -> Option<Integer> {
        match self {
            Self::Integer(val) => Some(*val),
            Self::UnsignedInteger(val) => Integer::try_from(*val).ok(),
            _ => None,
        }
    }

    /// The value as an unsigned integer.
    pub fn unsigned_integer(&self) -> Option<u64> {
        match self {
            Self::Integer(val) => u64::try_from(*val).ok(),
            Self::UnsignedInteger(val) => Some(*val),
            _ => None,
        }
    }

    /// The value as a [`f64`].
    pub fn float(&self) -> Option<f64> {
        match self {
            Self::Float(val) => Some(*val),
            _ => None,
        }
    }

    /// The value as a [`str`].
    pub fn string(&self) -> Option<&str> {
        match self {
            Self::String(val) => Some(val),
            _ => None,
        }
    }

    /// The value as a [`List`].
    pub fn list(&self) -> Option<&List> {
        match self {
            Self::List(val) => Some(val),
            _ => None,
        }
    }

    /// The value as a [`List`].
    pub fn list_mut(&mut self) -> Option<&mut List> {
        match self {
            Self::List(val) => Some(val),
            _ => None,
        }
    }

    /// The value as a [`Dictionary`].
    pub fn dictionary(&self) -> Option<&Dictionary> {
        match self {
            Self::Dictionary(val) => Some(val),
            _ => None,
        }
    }

    /// The value as a [`Dictionary`].
    pub fn dictionary_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Self::Dictionary(val) => Some(val),
            _ => None,
        }
    }

    /// Extracts a typed value, failing with [`TypeMismatch`] if the stored variant does not match.
    pub fn get<T>(self) -> Result<T, TypeMismatch>
    where
        T: WampDeserialize,
    {
        T::wamp_deserialize(self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::UnsignedInteger(a), Self::UnsignedInteger(b)) => a == b,
            (Self::Integer(a), Self::UnsignedInteger(b))
            | (Self::UnsignedInteger(b), Self::Integer(a)) => {
                u64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dictionary(a), Self::Dictionary(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<Integer> for Value {
    fn from(value: Integer) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        match Integer::try_from(value) {
            Ok(value) => Self::Integer(value),
            Err(_) => Self::UnsignedInteger(value),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Self::Null,
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(val) => serializer.serialize_bool(*val),
            Self::Integer(val) => serializer.serialize_i64(*val),
            Self::UnsignedInteger(val) => serializer.serialize_u64(*val),
            Self::Float(val) => serializer.serialize_f64(*val),
            Self::String(val) => serializer.serialize_str(val),
            Self::List(val) => val.serialize(serializer),
            Self::Dictionary(val) => val.serialize(serializer),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a WAMP value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(v))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut list = List::with_capacity(seq.size_hint().unwrap_or_default());
        while let Some(value) = seq.next_element()? {
            list.push(value);
        }
        Ok(Value::List(list))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut dictionary = Dictionary::with_capacity(map.size_hint().unwrap_or_default());
        while let Some((key, value)) = map.next_entry::<String, Value>()? {
            dictionary.insert(key, value);
        }
        Ok(Value::Dictionary(dictionary))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Error for extracting a typed value from a [`Value`] of another kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct TypeMismatch {
    pub expected: ValueKind,
    pub found: ValueKind,
}

impl TypeMismatch {
    pub fn new(expected: ValueKind, found: ValueKind) -> Self {
        Self { expected, found }
    }
}

/// Trait for extracting a Rust object from a WAMP value.
pub trait WampDeserialize: Sized {
    /// Deserializes the object from a WAMP value.
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch>;
}

impl WampDeserialize for Value {
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        Ok(value)
    }
}

impl WampDeserialize for bool {
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Bool(val) => Ok(val),
            _ => Err(TypeMismatch::new(ValueKind::Bool, value.kind())),
        }
    }
}

impl WampDeserialize for Integer {
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        value
            .integer()
            .ok_or_else(|| TypeMismatch::new(ValueKind::Integer, value.kind()))
    }
}

impl WampDeserialize for u64 {
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        value
            .unsigned_integer()
            .ok_or_else(|| TypeMismatch::new(ValueKind::UnsignedInteger, value.kind()))
    }
}

impl WampDeserialize for f64 {
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Float(val) => Ok(val),
            _ => Err(TypeMismatch::new(ValueKind::Float, value.kind())),
        }
    }
}

impl WampDeserialize for String {
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::String(val) => Ok(val),
            _ => Err(TypeMismatch::new(ValueKind::String, value.kind())),
        }
    }
}

impl WampDeserialize for List {
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::List(val) => Ok(val),
            _ => Err(TypeMismatch::new(ValueKind::List, value.kind())),
        }
    }
}

impl WampDeserialize for Dictionary {
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Dictionary(val) => Ok(val),
            _ => Err(TypeMismatch::new(ValueKind::Dictionary, value.kind())),
        }
    }
}

impl<T> WampDeserialize for Option<T>
where
    T: WampDeserialize,
{
    fn wamp_deserialize(value: Value) -> Result<Self, TypeMismatch> {
        match value {
            Value::Null => Ok(None),
            value => Ok(Some(T::wamp_deserialize(value)?)),
        }
    }
}
