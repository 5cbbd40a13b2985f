use crate::{
    core::{
        close::CloseReason,
        error::{
            ApplicationError,
            InteractionError,
            SessionError,
        },
        id::Id,
        types::{
            Dictionary,
            Value,
        },
    },
    message::message::{
        AbortMessage,
        ErrorMessage,
        GoodbyeMessage,
        Message,
        message_code,
    },
};

fn details_with_message(message: String) -> Dictionary {
    Dictionary::from_iter([("message".to_owned(), Value::String(message))])
}

pub fn abort_message_for_error(error: &SessionError) -> Message {
    Message::Abort(AbortMessage {
        details: details_with_message(error.to_string()),
        reason: error.uri(),
    })
}

pub fn goodbye_with_close_reason(close_reason: CloseReason) -> Message {
    Message::Goodbye(GoodbyeMessage {
        details: Dictionary::default(),
        reason: close_reason.uri(),
    })
}

pub fn goodbye_and_out() -> Message {
    goodbye_with_close_reason(CloseReason::GoodbyeAndOut)
}

/// An ERROR reply to an INVOCATION whose endpoint failed.
pub fn invocation_error(request: Id, error: ApplicationError) -> Message {
    Message::Error(ErrorMessage {
        request_type: message_code::INVOCATION,
        request,
        details: error.details(),
        error: error.error,
        arguments: error.arguments,
        arguments_keyword: error.arguments_keyword,
    })
}

/// An ERROR reply to an INVOCATION for a registration the session does not hold.
pub fn no_such_registration_error(request: Id, registration: Id) -> Message {
    Message::Error(ErrorMessage {
        request_type: message_code::INVOCATION,
        request,
        details: details_with_message(format!("no such registration: {registration}")),
        error: InteractionError::NoSuchRegistration.uri(),
        ..Default::default()
    })
}
