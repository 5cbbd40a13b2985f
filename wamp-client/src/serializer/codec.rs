use crate::{
    core::error::SessionError,
    message::message::Message,
    serializer::serializer::{
        Serializer,
        SerializerType,
        new_serializer,
    },
};

/// Encodes and decodes whole WAMP messages at the session boundary.
///
/// Decoding first reads the envelope generically, so a well-formed message of an unhandled type is
/// reported as [`SessionError::Unimplemented`] rather than as a decoding failure.
#[derive(Debug)]
pub struct MessageCodec {
    serializer: Box<dyn Serializer>,
}

impl MessageCodec {
    pub fn new(serializer_type: SerializerType) -> Self {
        Self::with_serializer(new_serializer(serializer_type))
    }

    pub fn with_serializer(serializer: Box<dyn Serializer>) -> Self {
        Self { serializer }
    }

    /// Encodes a message to bytes.
    pub fn encode_message(&self, message: &Message) -> Result<Vec<u8>, SessionError> {
        self.serializer
            .serialize(message)
            .map_err(|err| SessionError::Encode(format!("{err:#}")))
    }

    /// Decodes a message from bytes.
    pub fn decode_message(&self, bytes: &[u8]) -> Result<Message, SessionError> {
        let envelope = self
            .serializer
            .deserialize_list(bytes)
            .map_err(|err| SessionError::Decode(format!("message is not a list: {err:#}")))?;
        let code = match envelope.first() {
            Some(code) => code,
            None => return Err(SessionError::Decode("message is empty".to_owned())),
        };
        let code = code.unsigned_integer().ok_or_else(|| {
            SessionError::Decode(format!("message type must be an integer, found {}", code.kind()))
        })?;
        if !Message::is_known_code(code) {
            return Err(SessionError::Unimplemented(code));
        }
        self.serializer
            .deserialize(bytes)
            .map_err(|err| SessionError::Decode(format!("{err:#}")))
    }
}

#[cfg(test)]
mod codec_test {
    use pretty_assertions::assert_eq;

    use crate::{
        core::{
            error::SessionError,
            id::Id,
            types::{
                Dictionary,
                List,
                Value,
            },
            uri::Uri,
        },
        message::message::{
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
        serializer::{
            codec::MessageCodec,
            serializer::SerializerType,
        },
    };

    fn encode_value(value: Value) -> Vec<u8> {
        rmp_serde::to_vec(&value).unwrap()
    }

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    fn uri(value: &str) -> Uri {
        Uri::try_from(value).unwrap()
    }

    fn payload() -> List {
        List::from_iter([
            Value::UnsignedInteger(u64::MAX),
            Value::from(-42),
            Value::Integer(i64::MIN),
            Value::Float(1.0),
            Value::Null,
            Value::Bool(false),
            Value::from("text"),
        ])
    }

    fn nested_dictionary() -> Dictionary {
        Dictionary::from_iter([
            (
                "nested".to_owned(),
                Value::List(List::from_iter([
                    Value::from(1),
                    Value::Dictionary(Dictionary::from_iter([(
                        "deep".to_owned(),
                        Value::List(List::from_iter([Value::Null, Value::Float(-0.25)])),
                    )])),
                ])),
            ),
            ("limit".to_owned(), Value::UnsignedInteger(u64::MAX)),
        ])
    }

    fn every_message() -> Vec<Message> {
        Vec::from_iter([
            Message::Hello(HelloMessage {
                realm: uri("realm1"),
                details: nested_dictionary(),
            }),
            Message::Welcome(WelcomeMessage {
                session: Id::MAX,
                details: nested_dictionary(),
            }),
            Message::Abort(AbortMessage {
                details: Dictionary::default(),
                reason: uri("wamp.error.protocol_violation"),
            }),
            Message::Goodbye(GoodbyeMessage {
                details: Dictionary::from_iter([("message".to_owned(), Value::from("bye"))]),
                reason: uri("wamp.close.normal"),
            }),
            Message::Error(ErrorMessage {
                request_type: message_code::INVOCATION,
                request: Id::MAX,
                details: Dictionary::default(),
                error: uri("com.example.error.invalid"),
                arguments: payload(),
                arguments_keyword: nested_dictionary(),
            }),
            Message::Publish(PublishMessage {
                request: id(1),
                options: Dictionary::default(),
                topic: uri("com.example.topic"),
                arguments: List::default(),
                arguments_keyword: nested_dictionary(),
            }),
            Message::Call(CallMessage {
                request: id(2),
                options: Dictionary::from_iter([(
                    "timeout".to_owned(),
                    Value::UnsignedInteger(u64::MAX),
                )]),
                procedure: uri("com.example.add"),
                arguments: payload(),
                arguments_keyword: Dictionary::default(),
            }),
            Message::Result(ResultMessage {
                call_request: id(2),
                details: Dictionary::default(),
                yield_arguments: List::default(),
                yield_arguments_keyword: nested_dictionary(),
            }),
            Message::Result(ResultMessage {
                call_request: Id::MAX,
                details: Dictionary::default(),
                yield_arguments: payload(),
                yield_arguments_keyword: Dictionary::default(),
            }),
            Message::Register(RegisterMessage {
                request: id(3),
                options: Dictionary::default(),
                procedure: uri("com.example.echo"),
            }),
            Message::Registered(RegisteredMessage {
                register_request: id(3),
                registration: Id::MAX,
            }),
            Message::Unregister(UnregisterMessage {
                request: id(4),
                registered_registration: Id::MAX,
            }),
            Message::Unregistered(UnregisteredMessage {
                unregister_request: id(4),
            }),
            Message::Invocation(InvocationMessage {
                request: id(5),
                registered_registration: Id::MAX,
                details: Dictionary::default(),
                call_arguments: payload(),
                call_arguments_keyword: nested_dictionary(),
            }),
            Message::Yield(YieldMessage {
                invocation_request: id(5),
                options: Dictionary::default(),
                arguments: List::default(),
                arguments_keyword: Dictionary::default(),
            }),
        ])
    }

    #[test]
    fn preserves_every_message_through_both_serializers() {
        for serializer in [SerializerType::Json, SerializerType::MessagePack] {
            let codec = MessageCodec::new(serializer);
            for message in every_message() {
                let bytes = codec.encode_message(&message).unwrap();
                assert_eq!(
                    codec.decode_message(&bytes),
                    Ok(message),
                    "{serializer:?}"
                );
            }
        }
    }

    #[test]
    fn omits_empty_keyword_arguments_but_keeps_positional_placeholder() {
        let codec = MessageCodec::new(SerializerType::Json);
        let message = Message::Result(ResultMessage {
            call_request: id(2),
            details: Dictionary::default(),
            yield_arguments: List::default(),
            yield_arguments_keyword: Dictionary::from_iter([("sum".to_owned(), Value::from(5))]),
        });
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&codec.encode_message(&message).unwrap())
                .unwrap(),
            serde_json::json!([50, 2, {}, [], {"sum": 5}])
        );
        let message = Message::Yield(YieldMessage {
            invocation_request: id(5),
            ..Default::default()
        });
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&codec.encode_message(&message).unwrap())
                .unwrap(),
            serde_json::json!([70, 5, {}, []])
        );
    }

    #[test]
    fn decodes_encoded_message_pack_messages() {
        let codec = MessageCodec::new(SerializerType::MessagePack);
        let message = Message::Invocation(InvocationMessage {
            request: Id::try_from(7).unwrap(),
            registered_registration: Id::try_from(42).unwrap(),
            details: Dictionary::from_iter([("procedure".to_owned(), Value::from("com.example.echo"))]),
            call_arguments: List::from_iter([Value::from("hi"), Value::Float(0.5), Value::Null]),
            call_arguments_keyword: Dictionary::from_iter([("n".to_owned(), Value::from(-3))]),
        });
        let bytes = codec.encode_message(&message).unwrap();
        assert_eq!(codec.decode_message(&bytes), Ok(message));

        let message = Message::Error(ErrorMessage {
            request_type: message_code::CALL,
            request: Id::MAX,
            details: Dictionary::default(),
            error: Uri::try_from("com.example.error").unwrap(),
            arguments: List::default(),
            arguments_keyword: Dictionary::default(),
        });
        let bytes = codec.encode_message(&message).unwrap();
        assert_eq!(codec.decode_message(&bytes), Ok(message));
    }

    #[test]
    fn decodes_messages_written_by_other_peers() {
        let codec = MessageCodec::new(SerializerType::MessagePack);
        let bytes = encode_value(Value::List(List::from_iter([
            Value::from(2),
            Value::from(9001),
            Value::Dictionary(Dictionary::default()),
        ])));
        assert_matches::assert_matches!(codec.decode_message(&bytes), Ok(Message::Welcome(message)) => {
            assert_eq!(message.session, Id::try_from(9001).unwrap());
        });
    }

    #[test]
    fn reports_unimplemented_message_types() {
        let codec = MessageCodec::new(SerializerType::MessagePack);
        let bytes = encode_value(Value::List(List::from_iter([
            Value::from(36),
            Value::from(1),
            Value::from(2),
            Value::Dictionary(Dictionary::default()),
        ])));
        assert_eq!(
            codec.decode_message(&bytes),
            Err(SessionError::Unimplemented(36))
        );
    }

    #[test]
    fn fails_decoding_malformed_messages() {
        let codec = MessageCodec::new(SerializerType::MessagePack);

        assert_matches::assert_matches!(codec.decode_message(&[0xc1]), Err(SessionError::Decode(_)));
        assert_matches::assert_matches!(
            codec.decode_message(&encode_value(Value::from("hello"))),
            Err(SessionError::Decode(_))
        );
        assert_matches::assert_matches!(
            codec.decode_message(&encode_value(Value::List(List::default()))),
            Err(SessionError::Decode(_))
        );
        assert_matches::assert_matches!(
            codec.decode_message(&encode_value(Value::List(List::from_iter([
                Value::from("WELCOME"),
                Value::from(1),
            ])))),
            Err(SessionError::Decode(message)) => {
                assert!(message.contains("found string"), "{message}");
            }
        );
        assert_matches::assert_matches!(
            codec.decode_message(&encode_value(Value::List(List::from_iter([
                Value::from(65),
                Value::from(1),
            ])))),
            Err(SessionError::Decode(_))
        );
    }

    #[test]
    fn decodes_json_messages() {
        let codec = MessageCodec::new(SerializerType::Json);
        assert_matches::assert_matches!(
            codec.decode_message(br#"[67, 5]"#),
            Ok(Message::Unregistered(message)) => {
                assert_eq!(message.unregister_request, Id::try_from(5).unwrap());
            }
        );
        assert_matches::assert_matches!(
            codec.decode_message(br#"{"type": 2}"#),
            Err(SessionError::Decode(_))
        );
    }
}
