use std::time::Duration;

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        List,
    },
    uri::Uri,
};

/// A procedure call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcCall {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    /// How long to wait for the result before failing with
    /// [`crate::core::error::SessionError::CallTimeout`].
    ///
    /// A non-zero timeout is also forwarded to the router in the call options.
    pub timeout: Option<Duration>,
}

/// A result of a procedure call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcResult {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    pub details: Dictionary,
}

/// An event to publish to a topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishedEvent {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A procedure registered by this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The registration ID, assigned by the router.
    pub id: Id,
    pub procedure: Uri,
}
