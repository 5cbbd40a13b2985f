use anyhow::Result;

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        List,
        Value,
    },
    uri::Uri,
};

/// An invocation of a procedure registered by this peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The request ID of the INVOCATION, echoed in the reply.
    pub id: Id,
    /// The registration being invoked.
    pub registration: Id,
    /// The procedure URI the registration was made for.
    pub procedure: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    pub details: Dictionary,
}

/// The result of an invocation, sent back to the caller in a YIELD message.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcYield {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

impl RpcYield {
    /// A result with no payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result with a single positional value.
    pub fn value<V>(value: V) -> Self
    where
        V: Into<Value>,
    {
        Self::with_arguments(List::from_iter([value.into()]))
    }

    pub fn with_arguments(arguments: List) -> Self {
        Self {
            arguments,
            arguments_keyword: Dictionary::default(),
        }
    }

    pub fn with_arguments_keyword(arguments_keyword: Dictionary) -> Self {
        Self {
            arguments: List::default(),
            arguments_keyword,
        }
    }

    pub fn with_both(arguments: List, arguments_keyword: Dictionary) -> Self {
        Self {
            arguments,
            arguments_keyword,
        }
    }
}

/// A local procedure that can be registered with the router.
///
/// Endpoints run inline while the session dispatches the INVOCATION, so they must not block for
/// long. A failure is reported to the caller as an ERROR; return a
/// [`crate::core::error::ApplicationError`] to control its URI and payload.
pub trait Endpoint: Send {
    fn invoke(&mut self, invocation: Invocation) -> Result<RpcYield>;
}

impl<F> Endpoint for F
where
    F: FnMut(Invocation) -> Result<RpcYield> + Send,
{
    fn invoke(&mut self, invocation: Invocation) -> Result<RpcYield> {
        self(invocation)
    }
}

#[cfg(test)]
mod endpoint_test {
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
        peer::endpoint::{
            Endpoint,
            Invocation,
            RpcYield,
        },
    };

    #[test]
    fn invokes_stateful_closures() {
        let mut count = 0;
        let mut endpoint = move |invocation: Invocation| -> anyhow::Result<RpcYield> {
            count += 1;
            Ok(RpcYield::with_both(
                invocation.arguments,
                Dictionary::from_iter([("count".to_owned(), Value::from(count))]),
            ))
        };
        let invocation = Invocation {
            id: Id::try_from(1).unwrap(),
            registration: Id::try_from(2).unwrap(),
            procedure: Uri::try_from("com.example.count").unwrap(),
            arguments: List::from_iter([Value::from("a")]),
            arguments_keyword: Dictionary::default(),
            details: Dictionary::default(),
        };
        endpoint.invoke(invocation.clone()).unwrap();
        assert_matches::assert_matches!(endpoint.invoke(invocation), Ok(result) => {
            assert_eq!(result.arguments, List::from_iter([Value::from("a")]));
            assert_eq!(result.arguments_keyword.get("count"), Some(&Value::Integer(2)));
        });
    }

    #[test]
    fn builds_yields_of_each_shape() {
        assert_eq!(RpcYield::empty(), RpcYield::default());
        assert_eq!(
            RpcYield::value(5).arguments,
            List::from_iter([Value::Integer(5)])
        );
        let kwargs = Dictionary::from_iter([("a".to_owned(), Value::Bool(true))]);
        assert_eq!(
            RpcYield::with_arguments_keyword(kwargs.clone()),
            RpcYield {
                arguments: List::default(),
                arguments_keyword: kwargs,
            }
        );
    }
}
