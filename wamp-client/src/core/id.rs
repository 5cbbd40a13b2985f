use std::fmt::Display;

use serde::{
    Deserialize,
    Serialize,
    de::{
        Unexpected,
        Visitor,
    },
};
use thiserror::Error;
use wamp_values::Value;

/// An integer ID, used for identification of sessions, registrations, and requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Id(u64);

impl Id {
    /// The minimum allowable value of an ID.
    pub const MIN: Id = Id(1);

    /// The maximum allowable value of an ID.
    pub const MAX: Id = Id(1 << 53);

    /// The ID as an integer.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::MIN
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Id> for Value {
    fn from(value: Id) -> Self {
        Value::from(value.0)
    }
}

/// Error for an ID being out of range.
#[derive(Debug, Error)]
#[error("{value} is out of range for IDs")]
pub struct IdOutOfRange {
    value: u64,
}

impl IdOutOfRange {
    fn new(value: u64) -> Self {
        Self { value }
    }
}

impl TryFrom<u64> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < Self::MIN.0 || value > Self::MAX.0 {
            Err(IdOutOfRange::new(value))
        } else {
            Ok(Id(value))
        }
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            "an unsigned integer in the range [{}, {}]",
            Id::MIN,
            Id::MAX
        )
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Id::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::invalid_value(Unexpected::Signed(v), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_u64(IdVisitor)
    }
}

/// An ID allocator.
pub trait IdAllocator: Send + std::fmt::Debug {
    /// Generates a new ID.
    fn generate_id(&mut self) -> Id;
}

/// An ID allocator that generates IDs sequentially.
///
/// Used for session-scoped request IDs. Wraps back around to [`Id::MIN`] after [`Id::MAX`].
#[derive(Debug, Default)]
pub struct SequentialIdAllocator {
    next: Id,
}

impl IdAllocator for SequentialIdAllocator {
    fn generate_id(&mut self) -> Id {
        let id = self.next;
        self.next = if id == Id::MAX { Id::MIN } else { Id(id.0 + 1) };
        id
    }
}

#[cfg(test)]
mod id_test {
    use crate::core::id::{
        Id,
        IdAllocator,
        SequentialIdAllocator,
    };

    #[test]
    fn fails_deserialization_out_of_range() {
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"0"#), Err(err) => {
            assert!(err.to_string().contains("expected an unsigned integer in the range"));
        });
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"9007199254740993"#), Err(err) => {
            assert!(err.to_string().contains("expected an unsigned integer in the range"));
        });
        assert_matches::assert_matches!(serde_json::from_str::<Id>(r#"-4"#), Err(_));
    }

    #[test]
    fn deserializes_from_message_pack_integers() {
        let bytes = rmp_serde::to_vec(&7814135u64).unwrap();
        assert_matches::assert_matches!(rmp_serde::from_slice::<Id>(&bytes), Ok(id) => {
            assert_eq!(id.value(), 7814135);
        });
        let bytes = rmp_serde::to_vec(&12i64).unwrap();
        assert_matches::assert_matches!(rmp_serde::from_slice::<Id>(&bytes), Ok(id) => {
            assert_eq!(id.value(), 12);
        });
    }

    #[test]
    fn generates_sequential_ids_and_wraps() {
        let mut allocator = SequentialIdAllocator::default();
        assert_eq!(allocator.generate_id(), Id::MIN);
        assert_eq!(allocator.generate_id(), Id::try_from(2).unwrap());
        assert_eq!(allocator.generate_id(), Id::try_from(3).unwrap());

        allocator.next = Id::MAX;
        assert_eq!(allocator.generate_id(), Id::MAX);
        assert_eq!(allocator.generate_id(), Id::MIN);
    }
}
