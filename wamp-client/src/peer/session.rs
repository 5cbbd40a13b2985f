use log::{
    debug,
    error,
    info,
    trace,
    warn,
};
use tokio::{
    sync::mpsc::UnboundedSender,
    time::Instant,
};

use crate::{
    core::{
        close::CloseReason,
        error::{
            ApplicationError,
            RemoteError,
            SessionError,
        },
        id::{
            Id,
            IdAllocator,
            SequentialIdAllocator,
        },
        roles::{
            PeerRole,
            roles_dictionary,
        },
        types::{
            Dictionary,
            Value,
        },
        uri::Uri,
    },
    message::{
        common::{
            abort_message_for_error,
            goodbye_and_out,
            goodbye_with_close_reason,
            invocation_error,
            no_such_registration_error,
        },
        message::{
            AbortMessage,
            CallMessage,
            ErrorMessage,
            GoodbyeMessage,
            HelloMessage,
            InvocationMessage,
            Message,
            PublishMessage,
            RegisterMessage,
            RegisteredMessage,
            ResultMessage,
            UnregisterMessage,
            UnregisteredMessage,
            WelcomeMessage,
            YieldMessage,
            message_code,
        },
    },
    peer::{
        correlation::{
            CallEntry,
            CorrelationTables,
            RegistrationEntry,
            RegistrationRequestEntry,
            UnregistrationEntry,
        },
        endpoint::{
            Endpoint,
            Invocation,
        },
        peer::PeerConfig,
        pending::{
            Completion,
            PendingJoin,
            PendingLeave,
            PendingRegistration,
            PendingResponse,
            PendingRpcResult,
            PendingUnregistration,
            complete,
        },
        rpc::{
            PublishedEvent,
            Registration,
            RpcCall,
            RpcResult,
        },
        state::{
            EstablishedState,
            HelloSentState,
            SessionPhase,
            SessionState,
        },
    },
    serializer::codec::MessageCodec,
};

/// The client side of a single WAMP session.
///
/// The session never performs I/O itself. Encoded outbound messages are pushed to a channel, and
/// inbound frames are fed in through [`Session::handle_frame`] in transport order. Every operation
/// returns a [`PendingResponse`] that is resolved exactly once by a later inbound message, by
/// [`Session::expire_calls`], or by the session ending.
pub struct Session {
    name: String,
    agent: String,
    roles: Vec<PeerRole>,
    codec: MessageCodec,
    outbound_tx: UnboundedSender<Vec<u8>>,
    state: SessionState,
    id_allocator: SequentialIdAllocator,
    tables: CorrelationTables,
    join: Option<Completion<Id>>,
    leave: Option<Completion<Uri>>,
}

impl Session {
    pub fn new(config: &PeerConfig, outbound_tx: UnboundedSender<Vec<u8>>) -> Self {
        Self {
            name: config.name.clone(),
            agent: config.agent.clone(),
            roles: config.roles.clone(),
            codec: MessageCodec::new(config.serializer),
            outbound_tx,
            state: SessionState::default(),
            id_allocator: SequentialIdAllocator::default(),
            tables: CorrelationTables::default(),
            join: None,
            leave: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// The session ID assigned by the router.
    pub fn session_id(&self) -> Option<Id> {
        self.state.session_id()
    }

    /// The number of requests waiting for a response.
    pub fn outstanding_requests(&self) -> usize {
        self.tables.outstanding_requests()
    }

    /// The number of procedures registered by this session.
    pub fn registrations(&self) -> usize {
        self.tables.registrations()
    }

    /// The earliest call deadline, for arming a timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tables.next_deadline()
    }

    fn send(&mut self, message: Message) -> Result<(), SessionError> {
        trace!("Peer {} sending message: {message:?}", self.name);
        let bytes = self.codec.encode_message(&message)?;
        self.outbound_tx
            .send(bytes)
            .map_err(|_| SessionError::Transport("outbound channel closed".to_owned()))
    }

    fn next_request_id(&mut self) -> Id {
        loop {
            let id = self.id_allocator.generate_id();
            if !self.tables.is_outstanding(id) {
                return id;
            }
        }
    }

    fn established_session_state(&self) -> Result<&EstablishedState, SessionError> {
        match &self.state {
            SessionState::Established(state) => Ok(state),
            SessionState::Terminating(_) => Err(SessionError::SessionClosing),
            _ => Err(SessionError::SessionNotEstablished),
        }
    }

    fn transition_state(&mut self, state: SessionState) -> Result<(), SessionError> {
        if state == self.state {
            return Ok(());
        }

        if !self.state.allowed_state_transition(&state) {
            return Err(SessionError::Protocol(format!(
                "invalid state transition from {:?} to {state:?}",
                self.state
            )));
        }

        trace!(
            "Peer {} transitioned from {:?} to {state:?}",
            self.name, self.state
        );
        self.state = state;
        Ok(())
    }

    /// Joins a realm by sending HELLO.
    ///
    /// Sessions are single-use, so this only succeeds on a fresh session.
    pub fn join(&mut self, realm: Uri) -> Result<PendingJoin, SessionError> {
        if self.state != SessionState::Fresh {
            return Err(SessionError::SessionNotEstablished);
        }
        let details = Dictionary::from_iter([
            ("agent".to_owned(), Value::String(self.agent.clone())),
            (
                "roles".to_owned(),
                Value::Dictionary(roles_dictionary(&self.roles)),
            ),
        ]);
        self.send(Message::Hello(HelloMessage {
            realm: realm.clone(),
            details,
        }))?;
        self.transition_state(SessionState::HelloSent(HelloSentState { realm }))?;
        let (completion, pending) = PendingResponse::new();
        self.join = Some(completion);
        Ok(pending)
    }

    /// Calls a procedure.
    ///
    /// The call stays pending until the router answers, its timeout passes, or the session ends.
    pub fn call(
        &mut self,
        procedure: Uri,
        rpc_call: RpcCall,
    ) -> Result<PendingRpcResult, SessionError> {
        self.established_session_state()?;
        let request = self.next_request_id();
        let mut options = Dictionary::default();
        let timeout_ms = rpc_call.timeout.map(|timeout| timeout.as_millis()).unwrap_or(0);
        if timeout_ms > 0 {
            options.insert(
                "timeout".to_owned(),
                Value::from(u64::try_from(timeout_ms).unwrap_or(u64::MAX)),
            );
        }
        // A timeout too large to represent never expires.
        let deadline = rpc_call
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        self.send(Message::Call(CallMessage {
            request,
            options,
            procedure: procedure.clone(),
            arguments: rpc_call.arguments,
            arguments_keyword: rpc_call.arguments_keyword,
        }))?;
        let (completion, pending) = PendingResponse::new();
        self.tables.insert_call(
            request,
            CallEntry {
                procedure,
                deadline,
                completion,
            },
        );
        Ok(pending)
    }

    /// Publishes an event to a topic.
    ///
    /// Publication is not acknowledged, so nothing is tracked once the message is sent.
    pub fn publish(&mut self, topic: Uri, event: PublishedEvent) -> Result<(), SessionError> {
        self.established_session_state()?;
        let request = self.next_request_id();
        self.send(Message::Publish(PublishMessage {
            request,
            options: Dictionary::default(),
            topic,
            arguments: event.arguments,
            arguments_keyword: event.arguments_keyword,
        }))
    }

    /// Registers a procedure, to be served by the given endpoint once the router confirms it.
    pub fn register<E>(
        &mut self,
        procedure: Uri,
        endpoint: E,
    ) -> Result<PendingRegistration, SessionError>
    where
        E: Endpoint + 'static,
    {
        self.register_boxed(procedure, Box::new(endpoint))
    }

    pub(crate) fn register_boxed(
        &mut self,
        procedure: Uri,
        endpoint: Box<dyn Endpoint>,
    ) -> Result<PendingRegistration, SessionError> {
        self.established_session_state()?;
        let request = self.next_request_id();
        self.send(Message::Register(RegisterMessage {
            request,
            options: Dictionary::default(),
            procedure: procedure.clone(),
        }))?;
        let (completion, pending) = PendingResponse::new();
        self.tables.insert_registration_request(
            request,
            RegistrationRequestEntry {
                procedure,
                endpoint,
                completion,
            },
        );
        Ok(pending)
    }

    /// Unregisters a procedure registered by this session.
    ///
    /// The endpoint keeps serving invocations until the router confirms.
    pub fn unregister(&mut self, registration: Id) -> Result<PendingUnregistration, SessionError> {
        self.established_session_state()?;
        if !self.tables.has_registration(registration) {
            return Err(SessionError::NoSuchRegistration(registration));
        }
        let request = self.next_request_id();
        self.send(Message::Unregister(UnregisterMessage {
            request,
            registered_registration: registration,
        }))?;
        let (completion, pending) = PendingResponse::new();
        self.tables.insert_unregistration_request(
            request,
            UnregistrationEntry {
                registration,
                completion,
            },
        );
        Ok(pending)
    }

    /// Leaves the realm by sending GOODBYE.
    ///
    /// Every outstanding request fails with [`SessionError::SessionClosing`]. The returned future
    /// resolves to the reason in the router's GOODBYE.
    pub fn leave(&mut self) -> Result<PendingLeave, SessionError> {
        let state = self.established_session_state()?.clone();
        self.send(goodbye_with_close_reason(CloseReason::Normal))?;
        self.transition_state(SessionState::Terminating(state))?;
        self.tables.fail_requests(&SessionError::SessionClosing);
        let (completion, pending) = PendingResponse::new();
        self.leave = Some(completion);
        Ok(pending)
    }

    /// Fails every call whose deadline has passed with [`SessionError::CallTimeout`].
    ///
    /// Returns the number of expired calls.
    pub fn expire_calls(&mut self, now: Instant) -> usize {
        let expired = self.tables.take_expired_calls(now);
        let count = expired.len();
        for (request, call) in expired {
            debug!(
                "Peer {} call {request} to {} timed out",
                self.name, call.procedure
            );
            complete(call.completion, Err(SessionError::CallTimeout));
        }
        count
    }

    /// Ends the session after the transport closed.
    pub fn transport_closed(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        info!("Peer {} lost connection to the router", self.name);
        self.state = SessionState::Closed;
        self.end_session(&SessionError::SessionClosing);
    }

    fn end_session(&mut self, error: &SessionError) {
        if let Some(join) = self.join.take() {
            complete(join, Err(error.clone()));
        }
        if let Some(leave) = self.leave.take() {
            complete(leave, Err(SessionError::SessionClosing));
        }
        self.tables.clear(&SessionError::SessionClosing);
    }

    /// Aborts the session for a fatal error.
    fn abort(&mut self, error: SessionError) -> SessionError {
        error!("Peer {} aborting session: {error}", self.name);
        if !self.state.is_terminal() {
            // The transport may already be gone.
            self.send(abort_message_for_error(&error)).ok();
            self.state = SessionState::Aborted;
        }
        self.end_session(&error);
        error
    }

    /// Handles one complete inbound frame.
    ///
    /// Errors tied to a single request resolve that request and are not returned. A returned error
    /// is either fatal, in which case the session has already been aborted, or informational.
    pub fn handle_frame(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let message = match self.codec.decode_message(bytes) {
            Ok(message) => message,
            Err(SessionError::Unimplemented(code)) => {
                warn!(
                    "Peer {} received unimplemented message type {code}",
                    self.name
                );
                return Ok(());
            }
            Err(err) => return Err(self.abort(err)),
        };
        self.handle_message(message)
    }

    /// Handles one decoded inbound message.
    pub fn handle_message(&mut self, message: Message) -> Result<(), SessionError> {
        trace!("Peer {} received message: {message:?}", self.name);
        match self.handle_message_on_state_machine(message) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(self.abort(err)),
            Err(err) => Err(err),
        }
    }

    fn handle_message_on_state_machine(&mut self, message: Message) -> Result<(), SessionError> {
        match self.state {
            SessionState::Fresh => Err(SessionError::Protocol(format!(
                "received {} message before joining a realm",
                message.message_name()
            ))),
            SessionState::HelloSent(ref state) => {
                let realm = state.realm.clone();
                self.handle_hello_sent(realm, message)
            }
            SessionState::Established(_) => self.handle_established(message),
            SessionState::Terminating(_) => self.handle_terminating(message),
            SessionState::Closed | SessionState::Aborted => {
                debug!(
                    "Peer {} ignoring {} message on a finished session",
                    self.name,
                    message.message_name()
                );
                Ok(())
            }
        }
    }

    fn handle_hello_sent(&mut self, realm: Uri, message: Message) -> Result<(), SessionError> {
        match message {
            Message::Welcome(message) => self.on_welcome(realm, message),
            Message::Abort(message) => {
                warn!(
                    "Peer {} was refused by the router: {}",
                    self.name, message.reason
                );
                self.transition_state(SessionState::Aborted)?;
                let error = SessionError::JoinRefused {
                    reason: message.reason,
                    message: message
                        .details
                        .get("message")
                        .and_then(Value::string)
                        .unwrap_or_default()
                        .to_owned(),
                };
                self.end_session(&error);
                Ok(())
            }
            _ => Err(SessionError::Protocol(format!(
                "received {} message on an establishing session",
                message.message_name()
            ))),
        }
    }

    fn on_welcome(&mut self, realm: Uri, message: WelcomeMessage) -> Result<(), SessionError> {
        self.transition_state(SessionState::Established(EstablishedState {
            realm: realm.clone(),
            session_id: message.session,
        }))?;
        info!(
            "Peer {} started session {} on realm {realm}",
            self.name, message.session
        );
        if let Some(join) = self.join.take() {
            complete(join, Ok(message.session));
        }
        Ok(())
    }

    fn handle_established(&mut self, message: Message) -> Result<(), SessionError> {
        match message {
            Message::Result(message) => {
                self.on_result(message);
                Ok(())
            }
            Message::Error(message) => {
                self.on_error(message);
                Ok(())
            }
            Message::Registered(message) => {
                self.on_registered(message);
                Ok(())
            }
            Message::Unregistered(message) => {
                self.on_unregistered(message);
                Ok(())
            }
            Message::Invocation(message) => self.on_invocation(message),
            Message::Goodbye(message) => {
                info!(
                    "Peer {} session closed by the router: {}",
                    self.name, message.reason
                );
                self.send(goodbye_and_out())?;
                self.transition_state(SessionState::Closed)?;
                self.end_session(&SessionError::SessionClosing);
                Ok(())
            }
            Message::Abort(message) => {
                self.on_abort(message);
                Ok(())
            }
            _ => Err(SessionError::Protocol(format!(
                "received {} message on an established session",
                message.message_name()
            ))),
        }
    }

    fn handle_terminating(&mut self, message: Message) -> Result<(), SessionError> {
        match message {
            Message::Goodbye(GoodbyeMessage { reason, .. }) => {
                info!("Peer {} left realm: {reason}", self.name);
                self.transition_state(SessionState::Closed)?;
                if let Some(leave) = self.leave.take() {
                    complete(leave, Ok(reason));
                }
                self.end_session(&SessionError::SessionClosing);
                Ok(())
            }
            Message::Abort(message) => {
                if let Some(leave) = self.leave.take() {
                    complete(leave, Ok(message.reason.clone()));
                }
                self.on_abort(message);
                Ok(())
            }
            message @ (Message::Result(_)
            | Message::Error(_)
            | Message::Registered(_)
            | Message::Unregistered(_)
            | Message::Invocation(_)) => {
                debug!(
                    "Peer {} ignoring {} message for request {:?} while leaving the realm",
                    self.name,
                    message.message_name(),
                    message.request_id()
                );
                Ok(())
            }
            _ => Err(SessionError::Protocol(format!(
                "received {} message on a closing session",
                message.message_name()
            ))),
        }
    }

    fn on_abort(&mut self, message: AbortMessage) {
        warn!(
            "Peer {} session {:?} aborted by the router: {}",
            self.name,
            self.session_id(),
            message.reason
        );
        self.state = SessionState::Aborted;
        self.end_session(&SessionError::SessionClosing);
    }

    fn on_result(&mut self, message: ResultMessage) {
        match self.tables.take_call(message.call_request) {
            Some(call) => complete(
                call.completion,
                Ok(RpcResult {
                    arguments: message.yield_arguments,
                    arguments_keyword: message.yield_arguments_keyword,
                    details: message.details,
                }),
            ),
            None => debug!(
                "Peer {} received RESULT for unknown request {}",
                self.name, message.call_request
            ),
        }
    }

    fn on_error(&mut self, message: ErrorMessage) {
        let request = message.request;
        let request_type = message.request_type;
        let error = SessionError::Remote(RemoteError::from(message));
        match request_type {
            message_code::CALL => {
                if let Some(call) = self.tables.take_call(request) {
                    return complete(call.completion, Err(error));
                }
            }
            message_code::REGISTER => {
                if let Some(entry) = self.tables.take_registration_request(request) {
                    return complete(entry.completion, Err(error));
                }
            }
            message_code::UNREGISTER => {
                if let Some(entry) = self.tables.take_unregistration_request(request) {
                    return complete(entry.completion, Err(error));
                }
            }
            _ => (),
        }
        debug!(
            "Peer {} received ERROR for unknown request {request} of type {request_type}",
            self.name
        );
    }

    fn on_registered(&mut self, message: RegisteredMessage) {
        let entry = match self.tables.take_registration_request(message.register_request) {
            Some(entry) => entry,
            None => {
                debug!(
                    "Peer {} received REGISTERED for unknown request {}",
                    self.name, message.register_request
                );
                return;
            }
        };
        debug!(
            "Peer {} registered {} as {}",
            self.name, entry.procedure, message.registration
        );
        self.tables.install_registration(
            message.registration,
            RegistrationEntry {
                procedure: entry.procedure.clone(),
                endpoint: entry.endpoint,
            },
        );
        complete(
            entry.completion,
            Ok(Registration {
                id: message.registration,
                procedure: entry.procedure,
            }),
        );
    }

    fn on_unregistered(&mut self, message: UnregisteredMessage) {
        match self
            .tables
            .take_unregistration_request(message.unregister_request)
        {
            Some(entry) => {
                self.tables.remove_registration(entry.registration);
                debug!(
                    "Peer {} unregistered {}",
                    self.name, entry.registration
                );
                complete(entry.completion, Ok(()));
            }
            None => debug!(
                "Peer {} received UNREGISTERED for unknown request {}",
                self.name, message.unregister_request
            ),
        }
    }

    fn on_invocation(&mut self, message: InvocationMessage) -> Result<(), SessionError> {
        let request = message.request;
        let registration = message.registered_registration;
        let reply = match self.tables.registration_mut(registration) {
            Some(entry) => {
                let invocation = Invocation {
                    id: request,
                    registration,
                    procedure: entry.procedure.clone(),
                    arguments: message.call_arguments,
                    arguments_keyword: message.call_arguments_keyword,
                    details: message.details,
                };
                match entry.endpoint.invoke(invocation) {
                    Ok(result) => Message::Yield(YieldMessage {
                        invocation_request: request,
                        options: Dictionary::default(),
                        arguments: result.arguments,
                        arguments_keyword: result.arguments_keyword,
                    }),
                    Err(err) => {
                        debug!(
                            "Peer {} invocation {request} of {} failed: {err:#}",
                            self.name, entry.procedure
                        );
                        invocation_error(request, ApplicationError::from(&err))
                    }
                }
            }
            None => {
                warn!(
                    "Peer {} received INVOCATION for unknown registration {registration}",
                    self.name
                );
                no_such_registration_error(request, registration)
            }
        };
        match self.send(reply) {
            // The caller must still get an answer.
            Err(SessionError::Encode(err)) => {
                warn!(
                    "Peer {} failed to encode reply to invocation {request}: {err}",
                    self.name
                );
                self.send(invocation_error(
                    request,
                    ApplicationError::runtime_error(format!("failed to encode result: {err}")),
                ))
            }
            result => result,
        }
    }
}
