mod correlation;
mod endpoint;
mod peer;
mod pending;
mod rpc;
mod session;
mod state;

pub use endpoint::{
    Endpoint,
    Invocation,
    RpcYield,
};
pub use peer::{
    Peer,
    PeerConfig,
};
pub use pending::{
    PendingJoin,
    PendingLeave,
    PendingRegistration,
    PendingResponse,
    PendingRpcResult,
    PendingUnregistration,
};
pub use rpc::{
    PublishedEvent,
    Registration,
    RpcCall,
    RpcResult,
};
pub use session::Session;
pub use state::{
    EstablishedState,
    HelloSentState,
    SessionPhase,
    SessionState,
};
