pub use wamp_values::{
    Dictionary,
    Integer,
    List,
    TypeMismatch,
    Value,
    ValueKind,
    WampDeserialize,
};
