use std::{
    future::Future,
    pin::Pin,
    task,
};

use futures_channel::oneshot;
use futures_util::FutureExt;

use crate::{
    core::{
        error::SessionError,
        id::Id,
        uri::Uri,
    },
    peer::rpc::{
        Registration,
        RpcResult,
    },
};

/// The sending half of a [`PendingResponse`], held in a correlation table.
pub(crate) type Completion<T> = oneshot::Sender<Result<T, SessionError>>;

/// Resolves a completion, ignoring a dropped receiver.
pub(crate) fn complete<T>(completion: Completion<T>, result: Result<T, SessionError>) {
    completion.send(result).ok();
}

/// A response to a request, resolved exactly once by the session.
///
/// If the session is dropped before answering, the response fails with
/// [`SessionError::SessionClosing`].
#[derive(Debug)]
#[must_use = "pending responses do nothing unless awaited"]
pub struct PendingResponse<T> {
    rx: oneshot::Receiver<Result<T, SessionError>>,
}

impl<T> PendingResponse<T> {
    pub(crate) fn new() -> (Completion<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl<T> Future for PendingResponse<T> {
    type Output = Result<T, SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
        match futures_util::ready!(self.rx.poll_unpin(cx)) {
            Ok(result) => task::Poll::Ready(result),
            Err(oneshot::Canceled) => task::Poll::Ready(Err(SessionError::SessionClosing)),
        }
    }
}

/// Resolves to the session ID when the router welcomes the session.
pub type PendingJoin = PendingResponse<Id>;

/// Resolves to the result of a procedure call.
pub type PendingRpcResult = PendingResponse<RpcResult>;

/// Resolves when the router confirms a registration.
pub type PendingRegistration = PendingResponse<Registration>;

/// Resolves when the router confirms an unregistration.
pub type PendingUnregistration = PendingResponse<()>;

/// Resolves to the reason the router gave for closing the session.
pub type PendingLeave = PendingResponse<Uri>;
