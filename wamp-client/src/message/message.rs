use serde_struct_tuple::{
    DeserializeStructTuple,
    SerializeStructTuple,
};
use serde_struct_tuple_enum::{
    DeserializeStructTupleEnum,
    SerializeStructTupleEnum,
};

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        List,
    },
    uri::Uri,
};

/// Message type codes, as they appear in the first element of every message.
pub mod message_code {
    pub const HELLO: u64 = 1;
    pub const WELCOME: u64 = 2;
    pub const ABORT: u64 = 3;
    pub const GOODBYE: u64 = 6;
    pub const ERROR: u64 = 8;
    pub const PUBLISH: u64 = 16;
    pub const CALL: u64 = 48;
    pub const RESULT: u64 = 50;
    pub const REGISTER: u64 = 64;
    pub const REGISTERED: u64 = 65;
    pub const UNREGISTER: u64 = 66;
    pub const UNREGISTERED: u64 = 67;
    pub const INVOCATION: u64 = 68;
    pub const YIELD: u64 = 70;
}

// Positional arguments are always written, even when empty, since the serializer stops at the
// first skipped field and keyword arguments follow them.

/// Sent to ask the router for a session in a realm.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct HelloMessage {
    pub realm: Uri,
    #[serde_struct_tuple(default)]
    pub details: Dictionary,
}

/// Received when the router accepts HELLO. Carries the session ID.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct WelcomeMessage {
    pub session: Id,
    #[serde_struct_tuple(default)]
    pub details: Dictionary,
}

/// Sent or received to end a session without a handshake.
///
/// Received in place of WELCOME when the router refuses to join.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct AbortMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// Sent to leave a realm, and received as the router's answer. A GOODBYE from the router while
/// established is answered with `wamp.close.goodbye_and_out`.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct GoodbyeMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// Received when the router or a callee fails a CALL, REGISTER or UNREGISTER. Sent to fail an
/// INVOCATION.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct ErrorMessage {
    pub request_type: u64,
    pub request: Id,
    pub details: Dictionary,
    pub error: Uri,
    #[serde_struct_tuple(default)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// Sent to publish an event. Never acknowledged.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct PublishMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: Uri,
    #[serde_struct_tuple(default)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// Sent to call a procedure through the router.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct CallMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
    #[serde_struct_tuple(default)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// Received with the outcome of an earlier CALL.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct ResultMessage {
    pub call_request: Id,
    pub details: Dictionary,
    #[serde_struct_tuple(default)]
    pub yield_arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub yield_arguments_keyword: Dictionary,
}

/// Sent to offer a procedure in the realm.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct RegisterMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
}

/// Received when the router accepts REGISTER.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct RegisteredMessage {
    pub register_request: Id,
    pub registration: Id,
}

/// Sent to withdraw a procedure this session registered.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct UnregisterMessage {
    pub request: Id,
    pub registered_registration: Id,
}

/// Received when the router accepts UNREGISTER.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct UnregisteredMessage {
    pub unregister_request: Id,
}

/// Received when a caller invokes one of this session's registrations.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct InvocationMessage {
    pub request: Id,
    pub registered_registration: Id,
    pub details: Dictionary,
    #[serde_struct_tuple(default)]
    pub call_arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub call_arguments_keyword: Dictionary,
}

/// Sent to answer an INVOCATION with the endpoint's result.
#[derive(Debug, Default, Clone, PartialEq, SerializeStructTuple, DeserializeStructTuple)]
pub struct YieldMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
    #[serde_struct_tuple(default)]
    pub arguments: List,
    #[serde_struct_tuple(default, skip_serializing_if = Dictionary::is_empty)]
    pub arguments_keyword: Dictionary,
}

/// A WAMP message handled by a client session.
#[derive(Debug, Clone, PartialEq, SerializeStructTupleEnum, DeserializeStructTupleEnum)]
#[tag(u64)]
pub enum Message {
    #[tag = 1]
    Hello(HelloMessage),
    #[tag = 2]
    Welcome(WelcomeMessage),
    #[tag = 3]
    Abort(AbortMessage),
    #[tag = 6]
    Goodbye(GoodbyeMessage),
    #[tag = 8]
    Error(ErrorMessage),
    #[tag = 16]
    Publish(PublishMessage),
    #[tag = 48]
    Call(CallMessage),
    #[tag = 50]
    Result(ResultMessage),
    #[tag = 64]
    Register(RegisterMessage),
    #[tag = 65]
    Registered(RegisteredMessage),
    #[tag = 66]
    Unregister(UnregisterMessage),
    #[tag = 67]
    Unregistered(UnregisteredMessage),
    #[tag = 68]
    Invocation(InvocationMessage),
    #[tag = 70]
    Yield(YieldMessage),
}

impl Message {
    /// Checks if the message type code is handled by [`Message`].
    pub fn is_known_code(code: u64) -> bool {
        matches!(
            code,
            message_code::HELLO
                | message_code::WELCOME
                | message_code::ABORT
                | message_code::GOODBYE
                | message_code::ERROR
                | message_code::PUBLISH
                | message_code::CALL
                | message_code::RESULT
                | message_code::REGISTER
                | message_code::REGISTERED
                | message_code::UNREGISTER
                | message_code::UNREGISTERED
                | message_code::INVOCATION
                | message_code::YIELD
        )
    }

    /// The message name, mostly for logging.
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Welcome(_) => "WELCOME",
            Self::Abort(_) => "ABORT",
            Self::Goodbye(_) => "GOODBYE",
            Self::Error(_) => "ERROR",
            Self::Publish(_) => "PUBLISH",
            Self::Call(_) => "CALL",
            Self::Result(_) => "RESULT",
            Self::Register(_) => "REGISTER",
            Self::Registered(_) => "REGISTERED",
            Self::Unregister(_) => "UNREGISTER",
            Self::Unregistered(_) => "UNREGISTERED",
            Self::Invocation(_) => "INVOCATION",
            Self::Yield(_) => "YIELD",
        }
    }

    /// The request ID on the message.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Publish(message) => Some(message.request),
            Self::Call(message) => Some(message.request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }
}

#[cfg(test)]
mod message_test {
    use pretty_assertions::assert_eq;

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
        message::message::{
            CallMessage,
            ErrorMessage,
            HelloMessage,
            InvocationMessage,
            Message,
            ResultMessage,
            YieldMessage,
            message_code,
        },
    };

    #[test]
    fn deserializes_message_from_tuple() {
        assert_matches::assert_matches!(serde_json::from_str(r#"
            [1, "realm1"]
        "#), Ok(Message::Hello(message)) => {
            assert_eq!(message, HelloMessage {
                realm: Uri::try_from("realm1").unwrap(),
                details: Dictionary::default(),
            })
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [48, 7814135, {}, "com.myapp.ping"]
        "#), Ok(Message::Call(message)) => {
            assert_eq!(message, CallMessage {
                request: Id::try_from(7814135).unwrap(),
                options: Dictionary::default(),
                procedure: Uri::try_from("com.myapp.ping").unwrap(),
                arguments: List::default(),
                arguments_keyword: Dictionary::default(),
            })
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [50, 7814135, {}, [], {"userid": 123, "karma": 10}]
        "#), Ok(Message::Result(message)) => {
            assert_eq!(message, ResultMessage {
                call_request: Id::try_from(7814135).unwrap(),
                details: Dictionary::default(),
                yield_arguments: List::default(),
                yield_arguments_keyword: Dictionary::from_iter([
                    ("userid".to_owned(), Value::Integer(123)),
                    ("karma".to_owned(), Value::Integer(10)),
                ]),
            })
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [68, 6131533, 9823526, {}, ["Hello, world!"]]
        "#), Ok(Message::Invocation(message)) => {
            assert_eq!(message, InvocationMessage {
                request: Id::try_from(6131533).unwrap(),
                registered_registration: Id::try_from(9823526).unwrap(),
                details: Dictionary::default(),
                call_arguments: List::from_iter([Value::String("Hello, world!".to_owned())]),
                call_arguments_keyword: Dictionary::default(),
            })
        });

        assert_matches::assert_matches!(serde_json::from_str(r#"
            [8, 48, 7814135, {}, "com.myapp.error.object_write_protected", ["Object is write protected."], {"severity": 3}]
        "#), Ok(Message::Error(message)) => {
            assert_eq!(message, ErrorMessage {
                request_type: message_code::CALL,
                request: Id::try_from(7814135).unwrap(),
                details: Dictionary::default(),
                error: Uri::try_from("com.myapp.error.object_write_protected").unwrap(),
                arguments: List::from_iter([Value::String("Object is write protected.".to_owned())]),
                arguments_keyword: Dictionary::from_iter([("severity".to_owned(), Value::Integer(3))]),
            })
        });
    }

    #[test]
    fn serializes_arguments_before_keyword_arguments() {
        let message = Message::Yield(YieldMessage {
            invocation_request: Id::try_from(6131533).unwrap(),
            options: Dictionary::default(),
            arguments: List::default(),
            arguments_keyword: Dictionary::from_iter([(
                "message".to_owned(),
                Value::String("hi".to_owned()),
            )]),
        });
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"[70,6131533,{},[],{"message":"hi"}]"#
        );

        let message = Message::Call(CallMessage {
            request: Id::try_from(1).unwrap(),
            options: Dictionary::default(),
            procedure: Uri::try_from("com.example.add").unwrap(),
            arguments: List::from_iter([Value::Integer(2), Value::Integer(3)]),
            arguments_keyword: Dictionary::default(),
        });
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"[48,1,{},"com.example.add",[2,3]]"#
        );
    }

    #[test]
    fn fails_deserialization_of_missing_fields() {
        assert_matches::assert_matches!(serde_json::from_str::<Message>(r#"[48, 1, {}]"#), Err(err) => {
            assert!(err.to_string().contains("missing field `procedure`"), "{err}");
        });
        assert_matches::assert_matches!(serde_json::from_str::<Message>(r#"[2, "not an id"]"#), Err(_));
    }

    #[test]
    fn reports_message_metadata() {
        let message: Message = serde_json::from_str(r#"[3, {}, "wamp.error.no_such_realm"]"#).unwrap();
        assert_eq!(message.message_name(), "ABORT");
        assert_eq!(message.request_id(), None);
        let message: Message = serde_json::from_str(r#"[50, 12, {}]"#).unwrap();
        assert_eq!(message.message_name(), "RESULT");
        assert_eq!(message.request_id(), Some(Id::try_from(12).unwrap()));
        assert!(Message::is_known_code(message_code::YIELD));
        assert!(!Message::is_known_code(36));
    }
}
