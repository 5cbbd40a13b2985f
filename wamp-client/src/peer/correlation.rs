use ahash::HashMap;
use tokio::time::Instant;

use crate::{
    core::{
        error::SessionError,
        id::Id,
        uri::Uri,
    },
    peer::{
        endpoint::Endpoint,
        pending::{
            Completion,
            complete,
        },
        rpc::{
            Registration,
            RpcResult,
        },
    },
};

/// An outstanding CALL.
pub(crate) struct CallEntry {
    pub procedure: Uri,
    pub deadline: Option<Instant>,
    pub completion: Completion<RpcResult>,
}

/// An outstanding REGISTER, holding the endpoint to install once the router confirms it.
pub(crate) struct RegistrationRequestEntry {
    pub procedure: Uri,
    pub endpoint: Box<dyn Endpoint>,
    pub completion: Completion<Registration>,
}

/// An outstanding UNREGISTER.
pub(crate) struct UnregistrationEntry {
    pub registration: Id,
    pub completion: Completion<()>,
}

/// A procedure the router has confirmed for this session.
pub(crate) struct RegistrationEntry {
    pub procedure: Uri,
    pub endpoint: Box<dyn Endpoint>,
}

/// Tables matching outstanding requests to their eventual responses.
///
/// Requests are keyed by request ID, which is unique across all request tables while the request is
/// outstanding. Active registrations are keyed by registration ID.
#[derive(Default)]
pub(crate) struct CorrelationTables {
    calls: HashMap<Id, CallEntry>,
    registration_requests: HashMap<Id, RegistrationRequestEntry>,
    unregistration_requests: HashMap<Id, UnregistrationEntry>,
    registrations: HashMap<Id, RegistrationEntry>,
}

impl CorrelationTables {
    /// Checks if a request ID is held by any outstanding request.
    pub fn is_outstanding(&self, request: Id) -> bool {
        self.calls.contains_key(&request)
            || self.registration_requests.contains_key(&request)
            || self.unregistration_requests.contains_key(&request)
    }

    /// The number of outstanding requests.
    pub fn outstanding_requests(&self) -> usize {
        self.calls.len() + self.registration_requests.len() + self.unregistration_requests.len()
    }

    pub fn insert_call(&mut self, request: Id, entry: CallEntry) {
        self.calls.insert(request, entry);
    }

    pub fn take_call(&mut self, request: Id) -> Option<CallEntry> {
        self.calls.remove(&request)
    }

    pub fn insert_registration_request(&mut self, request: Id, entry: RegistrationRequestEntry) {
        self.registration_requests.insert(request, entry);
    }

    pub fn take_registration_request(&mut self, request: Id) -> Option<RegistrationRequestEntry> {
        self.registration_requests.remove(&request)
    }

    pub fn insert_unregistration_request(&mut self, request: Id, entry: UnregistrationEntry) {
        self.unregistration_requests.insert(request, entry);
    }

    pub fn take_unregistration_request(&mut self, request: Id) -> Option<UnregistrationEntry> {
        self.unregistration_requests.remove(&request)
    }

    pub fn install_registration(&mut self, registration: Id, entry: RegistrationEntry) {
        self.registrations.insert(registration, entry);
    }

    pub fn remove_registration(&mut self, registration: Id) -> Option<RegistrationEntry> {
        self.registrations.remove(&registration)
    }

    pub fn registration_mut(&mut self, registration: Id) -> Option<&mut RegistrationEntry> {
        self.registrations.get_mut(&registration)
    }

    pub fn has_registration(&self, registration: Id) -> bool {
        self.registrations.contains_key(&registration)
    }

    pub fn registrations(&self) -> usize {
        self.registrations.len()
    }

    /// The earliest deadline of all outstanding calls.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.calls.values().filter_map(|call| call.deadline).min()
    }

    /// Removes every call whose deadline is at or before `now`.
    pub fn take_expired_calls(&mut self, now: Instant) -> Vec<(Id, CallEntry)> {
        let expired = self
            .calls
            .iter()
            .filter(|(_, call)| call.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(request, _)| *request)
            .collect::<Vec<_>>();
        expired
            .into_iter()
            .filter_map(|request| self.calls.remove_entry(&request))
            .collect()
    }

    /// Fails every outstanding request with the given error.
    ///
    /// Active registrations are kept.
    pub fn fail_requests(&mut self, error: &SessionError) {
        for (_, call) in self.calls.drain() {
            complete(call.completion, Err(error.clone()));
        }
        for (_, request) in self.registration_requests.drain() {
            complete(request.completion, Err(error.clone()));
        }
        for (_, request) in self.unregistration_requests.drain() {
            complete(request.completion, Err(error.clone()));
        }
    }

    /// Fails every outstanding request and drops every registration.
    pub fn clear(&mut self, error: &SessionError) {
        self.fail_requests(error);
        self.registrations.clear();
    }
}
