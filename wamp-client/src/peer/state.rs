use crate::core::{
    id::Id,
    uri::Uri,
};

/// State while waiting for the router to answer HELLO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloSentState {
    pub realm: Uri,
}

/// State of a session the router has welcomed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishedState {
    pub realm: Uri,
    pub session_id: Id,
}

/// The lifecycle state of a client session.
///
/// A session is single-use: once it reaches [`SessionState::Closed`] or
/// [`SessionState::Aborted`], it never leaves.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Fresh,
    HelloSent(HelloSentState),
    Established(EstablishedState),
    Terminating(EstablishedState),
    Closed,
    Aborted,
}

/// The phase of a session, without any state data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Fresh,
    HelloSent,
    Established,
    Terminating,
    Closed,
    Aborted,
}

impl SessionState {
    pub(crate) fn allowed_state_transition(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Fresh, Self::HelloSent(_)) => true,
            (Self::HelloSent(_), Self::Established(_)) => true,
            (Self::Established(_), Self::Terminating(_)) => true,
            (Self::Closed | Self::Aborted, _) => false,
            (_, Self::Closed | Self::Aborted) => true,
            _ => false,
        }
    }

    /// The phase of the session.
    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::Fresh => SessionPhase::Fresh,
            Self::HelloSent(_) => SessionPhase::HelloSent,
            Self::Established(_) => SessionPhase::Established,
            Self::Terminating(_) => SessionPhase::Terminating,
            Self::Closed => SessionPhase::Closed,
            Self::Aborted => SessionPhase::Aborted,
        }
    }

    /// Checks if the session can never be used again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }

    /// The session ID assigned by the router, if the session is established.
    pub fn session_id(&self) -> Option<Id> {
        match self {
            Self::Established(state) | Self::Terminating(state) => Some(state.session_id),
            _ => None,
        }
    }
}
