use std::fmt::Debug;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    Stream,
};

/// Data sent or received over a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportData {
    /// Data representing a meaningful WAMP message.
    Message(Vec<u8>),
    /// Data that should be perceived as a health check and immediately sent back to the sender as
    /// a [`TransportData::Pong`].
    Ping(Vec<u8>),
    /// Reply to a [`TransportData::Ping`], carrying the same payload.
    Pong(Vec<u8>),
}

/// A transport, over which WAMP messages can be sent and received.
///
/// Implemented as a [`Stream`] and [`Sink`] of complete frames. The stream ends when the
/// connection closes, and closing the sink closes the connection.
pub trait Transport:
    Send + Stream<Item = Result<TransportData>> + Sink<TransportData, Error = Error> + Unpin + Debug
{
}

impl<T> Transport for T where
    T: Send
        + Stream<Item = Result<TransportData>>
        + Sink<TransportData, Error = Error>
        + Unpin
        + Debug
{
}
