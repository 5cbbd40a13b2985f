use std::fmt::Display;

use thiserror::Error;

use crate::{
    core::{
        id::Id,
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::Uri,
    },
    message::message::ErrorMessage,
};

/// An error that occurs on a WAMP session.
///
/// Errors tied to a single request only fail that request. [`SessionError::Decode`] and
/// [`SessionError::Protocol`] are fatal to the whole session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// An inbound frame could not be decoded into a message.
    #[error("failed to decode message: {0}")]
    Decode(String),
    /// An outbound message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(String),
    /// The router sent a message that is illegal in the current session state.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The router sent a well-formed message of a type this client does not handle.
    #[error("unimplemented message type {0}")]
    Unimplemented(u64),
    /// The router refused to establish the session.
    #[error("join refused: {reason}")]
    JoinRefused { reason: Uri, message: String },
    /// The router or remote callee answered a request with an ERROR message.
    #[error(transparent)]
    Remote(RemoteError),
    /// The call did not receive a result before its deadline.
    #[error("call timed out")]
    CallTimeout,
    /// The registration is not held by this session.
    #[error("no such registration: {0}")]
    NoSuchRegistration(Id),
    /// The session is not established.
    #[error("session not established")]
    SessionNotEstablished,
    /// The session is closing or closed, so the request will never be answered.
    #[error("session closing")]
    SessionClosing,
    /// The transport failed.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl SessionError {
    /// Checks if the error terminates the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Protocol(_))
    }

    /// The WAMP URI describing the error.
    pub fn uri(&self) -> Uri {
        match self {
            Self::JoinRefused { reason, .. } => reason.clone(),
            Self::Remote(error) => error.error.clone(),
            _ => Uri::from_known(format!("wamp.error.{}", self.uri_component())),
        }
    }

    fn uri_component(&self) -> &str {
        match self {
            Self::Decode(_) | Self::Protocol(_) => "protocol_violation",
            Self::Unimplemented(_) => "protocol_violation",
            Self::Encode(_) => "invalid_argument",
            Self::JoinRefused { .. } => "not_authorized",
            Self::Remote(_) => "runtime_error",
            Self::CallTimeout => "timeout",
            Self::NoSuchRegistration(_) => "no_such_registration",
            Self::SessionNotEstablished => "not_established",
            Self::SessionClosing => "canceled",
            Self::Transport(_) => "network_failure",
        }
    }
}

/// An interaction error defined by the WAMP standard, reported by the router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteractionError {
    #[error("protocol violation")]
    ProtocolViolation,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("not authorized")]
    NotAuthorized,
    #[error("no such realm")]
    NoSuchRealm,
    #[error("no such procedure")]
    NoSuchProcedure,
    #[error("procedure already exists")]
    ProcedureAlreadyExists,
    #[error("no such registration")]
    NoSuchRegistration,
    #[error("canceled")]
    Canceled,
}

impl InteractionError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::ProtocolViolation => "protocol_violation",
            Self::InvalidArgument => "invalid_argument",
            Self::NotAuthorized => "not_authorized",
            Self::NoSuchRealm => "no_such_realm",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::ProcedureAlreadyExists => "procedure_already_exists",
            Self::NoSuchRegistration => "no_such_registration",
            Self::Canceled => "canceled",
        }
    }

    /// Parses a standard error URI.
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        match uri.as_ref() {
            "wamp.error.protocol_violation" => Some(Self::ProtocolViolation),
            "wamp.error.invalid_argument" => Some(Self::InvalidArgument),
            "wamp.error.not_authorized" => Some(Self::NotAuthorized),
            "wamp.error.no_such_realm" => Some(Self::NoSuchRealm),
            "wamp.error.no_such_procedure" => Some(Self::NoSuchProcedure),
            "wamp.error.procedure_already_exists" => Some(Self::ProcedureAlreadyExists),
            "wamp.error.no_such_registration" => Some(Self::NoSuchRegistration),
            "wamp.error.canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// URI for the error.
    pub fn uri(&self) -> Uri {
        Uri::from_known(format!("wamp.error.{}", self.uri_component()))
    }
}

/// An error reported by the router or a remote callee in an ERROR message.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub error: Uri,
    pub details: Dictionary,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

impl RemoteError {
    /// The human-readable message in the error details, if any.
    pub fn message(&self) -> Option<&str> {
        self.details.get("message").and_then(Value::string)
    }

    /// The standard interaction error the URI describes, if any.
    pub fn interaction_error(&self) -> Option<InteractionError> {
        InteractionError::from_uri(&self.error)
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {message}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for RemoteError {}

impl From<ErrorMessage> for RemoteError {
    fn from(value: ErrorMessage) -> Self {
        Self {
            error: value.error,
            details: value.details,
            arguments: value.arguments,
            arguments_keyword: value.arguments_keyword,
        }
    }
}

/// An error raised by a local procedure endpoint, sent back to the caller as an ERROR message.
///
/// Endpoints return [`anyhow::Error`]; any error that is not an [`ApplicationError`] is reported as
/// `wamp.error.runtime_error` with the error text as the message.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct ApplicationError {
    pub error: Uri,
    pub message: Option<String>,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

impl ApplicationError {
    /// Creates a new application error with the given URI.
    pub fn new(error: Uri) -> Self {
        Self {
            error,
            message: None,
            arguments: List::default(),
            arguments_keyword: Dictionary::default(),
        }
    }

    /// Creates a generic runtime error carrying a message.
    pub fn runtime_error<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: Some(message.into()),
            ..Self::new(Uri::from_known("wamp.error.runtime_error"))
        }
    }

    pub fn with_message<S>(mut self, message: S) -> Self
    where
        S: Into<String>,
    {
        self.message = Some(message.into());
        self
    }

    pub fn with_arguments(mut self, arguments: List) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_arguments_keyword(mut self, arguments_keyword: Dictionary) -> Self {
        self.arguments_keyword = arguments_keyword;
        self
    }

    /// The details dictionary sent with the error.
    pub fn details(&self) -> Dictionary {
        match &self.message {
            Some(message) => {
                Dictionary::from_iter([("message".to_owned(), Value::String(message.clone()))])
            }
            None => Dictionary::default(),
        }
    }
}

impl From<&anyhow::Error> for ApplicationError {
    fn from(value: &anyhow::Error) -> Self {
        match value.downcast_ref::<ApplicationError>() {
            Some(error) => error.clone(),
            None => Self::runtime_error(value.to_string()),
        }
    }
}

#[cfg(test)]
mod error_test {
    use crate::core::{
        error::{
            ApplicationError,
            InteractionError,
            RemoteError,
            SessionError,
        },
        id::Id,
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::Uri,
    };

    #[test]
    fn maps_session_errors_to_uris() {
        assert_eq!(
            SessionError::Protocol("bad".to_owned()).uri().as_ref(),
            "wamp.error.protocol_violation"
        );
        assert_eq!(
            SessionError::NoSuchRegistration(Id::try_from(4).unwrap())
                .uri()
                .as_ref(),
            "wamp.error.no_such_registration"
        );
        assert_eq!(
            SessionError::JoinRefused {
                reason: Uri::try_from("wamp.error.not_authorized").unwrap(),
                message: String::default(),
            }
            .uri()
            .as_ref(),
            "wamp.error.not_authorized"
        );
        assert!(SessionError::Decode("x".to_owned()).is_fatal());
        assert!(!SessionError::Unimplemented(36).is_fatal());
        assert!(!SessionError::CallTimeout.is_fatal());
    }

    #[test]
    fn formats_remote_error_with_message() {
        let error = RemoteError {
            error: Uri::try_from("wamp.error.no_such_procedure").unwrap(),
            details: Dictionary::from_iter([(
                "message".to_owned(),
                Value::String("procedure does not exist".to_owned()),
            )]),
            arguments: List::default(),
            arguments_keyword: Dictionary::default(),
        };
        assert_eq!(
            error.to_string(),
            "wamp.error.no_such_procedure: procedure does not exist"
        );
        assert_eq!(
            error.interaction_error(),
            Some(InteractionError::NoSuchProcedure)
        );
        assert_eq!(
            SessionError::Remote(error.clone()).to_string(),
            error.to_string()
        );
    }

    #[test]
    fn converts_endpoint_failures_to_application_errors() {
        let error = anyhow::Error::new(
            ApplicationError::new(Uri::try_from("com.example.invalid").unwrap())
                .with_arguments(List::from_iter([Value::Integer(1)])),
        );
        assert_matches::assert_matches!(ApplicationError::from(&error), error => {
            assert_eq!(error.error.as_ref(), "com.example.invalid");
            assert_eq!(error.arguments, List::from_iter([Value::Integer(1)]));
            assert_eq!(error.details(), Dictionary::default());
        });

        let error = anyhow::Error::msg("division by zero");
        assert_matches::assert_matches!(ApplicationError::from(&error), error => {
            assert_eq!(error.error.as_ref(), "wamp.error.runtime_error");
            assert_eq!(
                error.details().get("message"),
                Some(&Value::String("division by zero".to_owned()))
            );
        });
    }
}
