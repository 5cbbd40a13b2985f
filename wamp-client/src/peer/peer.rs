use anyhow::{
    Error,
    Result,
};
use futures_channel::oneshot;
use futures_util::{
    SinkExt,
    StreamExt,
    lock::Mutex,
};
use log::{
    debug,
    error,
    info,
};
use tokio::{
    net::TcpStream,
    sync::{
        broadcast,
        mpsc::{
            UnboundedReceiver,
            UnboundedSender,
            unbounded_channel,
        },
    },
    task::JoinHandle,
    time::Instant,
};

use crate::{
    core::{
        error::SessionError,
        id::Id,
        roles::PeerRole,
        uri::Uri,
    },
    peer::{
        endpoint::Endpoint,
        pending::{
            PendingJoin,
            PendingLeave,
            PendingRegistration,
            PendingRpcResult,
            PendingUnregistration,
        },
        rpc::{
            PublishedEvent,
            Registration,
            RpcCall,
            RpcResult,
        },
        session::Session,
    },
    serializer::serializer::SerializerType,
    transport::{
        raw_socket::{
            self,
            MAX_LENGTH_EXPONENT,
        },
        transport::{
            Transport,
            TransportData,
        },
    },
};

const DEFAULT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`Peer`].
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Name of the peer, mostly for logging.
    pub name: String,
    /// Agent name, communicated to the router.
    pub agent: String,
    /// Roles implemented by the peer, announced to the router.
    pub roles: Vec<PeerRole>,
    /// Serializer for messages.
    pub serializer: SerializerType,
    /// Exponent of the largest frame the peer accepts over RawSocket, as `2^(9 + exponent)` bytes.
    pub max_frame_length_exponent: u8,
}

impl PeerConfig {
    fn validate(&self) -> Result<()> {
        if self.roles.is_empty() {
            return Err(Error::msg("at least one role is required"));
        }
        if self.max_frame_length_exponent > MAX_LENGTH_EXPONENT {
            return Err(Error::msg(format!(
                "max frame length exponent must be at most {MAX_LENGTH_EXPONENT}"
            )));
        }
        Ok(())
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT.to_owned(),
            agent: DEFAULT_AGENT.to_owned(),
            roles: Vec::from_iter([PeerRole::Caller, PeerRole::Callee, PeerRole::Publisher]),
            serializer: SerializerType::MessagePack,
            max_frame_length_exponent: MAX_LENGTH_EXPONENT,
        }
    }
}

/// A request from a [`Peer`] to the task owning its [`Session`].
enum Command {
    Join {
        realm: Uri,
        response_tx: oneshot::Sender<Result<PendingJoin, SessionError>>,
    },
    Call {
        procedure: Uri,
        rpc_call: RpcCall,
        response_tx: oneshot::Sender<Result<PendingRpcResult, SessionError>>,
    },
    Publish {
        topic: Uri,
        event: PublishedEvent,
        response_tx: oneshot::Sender<Result<(), SessionError>>,
    },
    Register {
        procedure: Uri,
        endpoint: Box<dyn Endpoint>,
        response_tx: oneshot::Sender<Result<PendingRegistration, SessionError>>,
    },
    Unregister {
        registration: Id,
        response_tx: oneshot::Sender<Result<PendingUnregistration, SessionError>>,
    },
    Leave {
        response_tx: oneshot::Sender<Result<PendingLeave, SessionError>>,
    },
    SessionId {
        response_tx: oneshot::Sender<Option<Id>>,
    },
}

impl Command {
    fn handle(self, session: &mut Session) {
        // Receivers may have been dropped by callers that gave up waiting.
        match self {
            Self::Join { realm, response_tx } => {
                response_tx.send(session.join(realm)).ok();
            }
            Self::Call {
                procedure,
                rpc_call,
                response_tx,
            } => {
                response_tx.send(session.call(procedure, rpc_call)).ok();
            }
            Self::Publish {
                topic,
                event,
                response_tx,
            } => {
                response_tx.send(session.publish(topic, event)).ok();
            }
            Self::Register {
                procedure,
                endpoint,
                response_tx,
            } => {
                response_tx
                    .send(session.register_boxed(procedure, endpoint))
                    .ok();
            }
            Self::Unregister {
                registration,
                response_tx,
            } => {
                response_tx.send(session.unregister(registration)).ok();
            }
            Self::Leave { response_tx } => {
                response_tx.send(session.leave()).ok();
            }
            Self::SessionId { response_tx } => {
                response_tx.send(session.session_id()).ok();
            }
        }
    }
}

#[derive(Debug)]
struct PeerState {
    command_tx: UnboundedSender<Command>,
    cancel_tx: broadcast::Sender<()>,
    join_handle: JoinHandle<()>,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures_util::future::pending::<()>().await,
    }
}

/// A WAMP peer (a.k.a., client) that connects to a WAMP router, establishes a session in a realm,
/// and interacts with resources in the realm.
///
/// Each connection is served by one background task that exclusively owns the [`Session`]. Methods
/// on this type reach that task over a channel, so a peer can be shared across tasks.
#[derive(Debug)]
pub struct Peer {
    config: PeerConfig,
    peer_state: Mutex<Option<PeerState>>,
}

impl Peer {
    /// Creates a new peer.
    pub fn new(config: PeerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            peer_state: Mutex::new(None),
        })
    }

    /// Connects to a router over TCP, using the RawSocket transport.
    ///
    /// This method establishes the connection only. Use [`Self::join_realm`] to start a session.
    pub async fn connect(&self, address: &str) -> Result<()> {
        let stream = TcpStream::connect(address).await?;
        let transport = raw_socket::connect(
            stream,
            self.config.serializer,
            self.config.max_frame_length_exponent,
        )
        .await?;
        info!(
            "WAMP connection established with {address} for peer {}",
            self.config.name
        );
        self.direct_connect(transport).await
    }

    /// Directly connects to a router over the given transport.
    ///
    /// Any active connection is ended first.
    pub async fn direct_connect<T>(&self, transport: T) -> Result<()>
    where
        T: Transport + 'static,
    {
        let mut peer_state = self.peer_state.lock().await;
        if let Some(state) = peer_state.take() {
            Self::end_connection(state).await;
        }

        let (outbound_tx, outbound_rx) = unbounded_channel();
        let (command_tx, command_rx) = unbounded_channel();
        let (cancel_tx, cancel_rx) = broadcast::channel(1);
        let session = Session::new(&self.config, outbound_tx);
        let join_handle = tokio::spawn(Self::run(
            transport,
            session,
            outbound_rx,
            command_rx,
            cancel_rx,
        ));
        *peer_state = Some(PeerState {
            command_tx,
            cancel_tx,
            join_handle,
        });
        Ok(())
    }

    async fn end_connection(state: PeerState) {
        state.cancel_tx.send(()).ok();
        if let Err(err) = state.join_handle.await {
            error!("Peer connection task failed: {err}");
        }
    }

    async fn run<T>(
        mut transport: T,
        mut session: Session,
        mut outbound_rx: UnboundedReceiver<Vec<u8>>,
        mut command_rx: UnboundedReceiver<Command>,
        mut cancel_rx: broadcast::Receiver<()>,
    ) where
        T: Transport,
    {
        if let Err(err) = Self::session_loop(
            &mut transport,
            &mut session,
            &mut outbound_rx,
            &mut command_rx,
            &mut cancel_rx,
        )
        .await
        {
            error!("Peer session {} failed: {err:#}", session.name());
        }

        // Flush messages the session queued on its way out, such as GOODBYE or ABORT.
        while let Ok(bytes) = outbound_rx.try_recv() {
            if transport.send(TransportData::Message(bytes)).await.is_err() {
                break;
            }
        }
        transport.close().await.ok();
        session.transport_closed();
        info!("Peer {} disconnected from the router", session.name());
    }

    async fn session_loop<T>(
        transport: &mut T,
        session: &mut Session,
        outbound_rx: &mut UnboundedReceiver<Vec<u8>>,
        command_rx: &mut UnboundedReceiver<Command>,
        cancel_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()>
    where
        T: Transport,
    {
        loop {
            let deadline = session.next_deadline();
            tokio::select! {
                frame = transport.next() => {
                    match frame {
                        Some(Ok(TransportData::Message(bytes))) => {
                            if let Err(err) = session.handle_frame(&bytes) {
                                if err.is_fatal() {
                                    return Err(Error::new(err).context("failed to handle message"));
                                }
                                debug!("Peer {} failed to handle message: {err}", session.name());
                            }
                        }
                        Some(Ok(TransportData::Ping(data))) => {
                            transport.send(TransportData::Pong(data)).await?;
                        }
                        Some(Ok(TransportData::Pong(_))) => (),
                        Some(Err(err)) => return Err(err.context("failed to receive frame")),
                        None => return Ok(()),
                    }
                }
                bytes = outbound_rx.recv() => {
                    match bytes {
                        Some(bytes) => transport.send(TransportData::Message(bytes)).await?,
                        None => return Err(Error::msg("outbound channel closed")),
                    }
                }
                command = command_rx.recv() => {
                    match command {
                        Some(command) => command.handle(session),
                        // The peer was dropped.
                        None => return Ok(()),
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    session.expire_calls(Instant::now());
                }
                _ = cancel_rx.recv() => return Ok(()),
            }

            if session.state().is_terminal() {
                return Ok(());
            }
        }
    }

    async fn send_command<T, F>(&self, command: F) -> Result<T, SessionError>
    where
        F: FnOnce(oneshot::Sender<T>) -> Command,
    {
        let (response_tx, response_rx) = oneshot::channel();
        {
            let peer_state = self.peer_state.lock().await;
            let peer_state = peer_state
                .as_ref()
                .ok_or(SessionError::SessionNotEstablished)?;
            peer_state
                .command_tx
                .send(command(response_tx))
                .map_err(|_| SessionError::SessionNotEstablished)?;
        }
        response_rx
            .await
            .map_err(|_| SessionError::SessionNotEstablished)
    }

    /// The current session ID, as given by the router.
    pub async fn current_session_id(&self) -> Option<Id> {
        self.send_command(|response_tx| Command::SessionId { response_tx })
            .await
            .ok()
            .flatten()
    }

    /// Joins the realm, establishing a WAMP session.
    ///
    /// Resolves to the session ID assigned by the router.
    pub async fn join_realm(&self, realm: Uri) -> Result<Id, SessionError> {
        let pending = self
            .send_command(|response_tx| Command::Join { realm, response_tx })
            .await??;
        pending.await
    }

    /// Calls a procedure, returning the pending result.
    pub async fn call(
        &self,
        procedure: Uri,
        rpc_call: RpcCall,
    ) -> Result<PendingRpcResult, SessionError> {
        self.send_command(|response_tx| Command::Call {
            procedure,
            rpc_call,
            response_tx,
        })
        .await?
    }

    /// Calls a procedure and waits for its result.
    pub async fn call_and_wait(
        &self,
        procedure: Uri,
        rpc_call: RpcCall,
    ) -> Result<RpcResult, SessionError> {
        self.call(procedure, rpc_call).await?.await
    }

    /// Publishes an event to a topic.
    pub async fn publish(&self, topic: Uri, event: PublishedEvent) -> Result<(), SessionError> {
        self.send_command(|response_tx| Command::Publish {
            topic,
            event,
            response_tx,
        })
        .await?
    }

    /// Registers a procedure served by the given endpoint.
    pub async fn register<E>(&self, procedure: Uri, endpoint: E) -> Result<Registration, SessionError>
    where
        E: Endpoint + 'static,
    {
        let endpoint: Box<dyn Endpoint> = Box::new(endpoint);
        let pending = self
            .send_command(|response_tx| Command::Register {
                procedure,
                endpoint,
                response_tx,
            })
            .await??;
        pending.await
    }

    /// Unregisters a procedure.
    pub async fn unregister(&self, registration: Id) -> Result<(), SessionError> {
        let pending = self
            .send_command(|response_tx| Command::Unregister {
                registration,
                response_tx,
            })
            .await??;
        pending.await
    }

    /// Leaves the realm, ending the WAMP session.
    ///
    /// Resolves to the reason the router gave for closing the session. The connection is closed
    /// afterwards, since sessions are not reused.
    pub async fn leave_realm(&self) -> Result<Uri, SessionError> {
        let pending = self
            .send_command(|response_tx| Command::Leave { response_tx })
            .await??;
        pending.await
    }

    /// Disconnects from the router.
    ///
    /// Pending requests fail with [`SessionError::SessionClosing`].
    pub async fn disconnect(&self) -> Result<()> {
        match self.peer_state.lock().await.take() {
            Some(state) => {
                Self::end_connection(state).await;
                Ok(())
            }
            None => Err(Error::msg("peer is not connected")),
        }
    }
}
