use std::fmt::Display;

use wamp_values::{
    Dictionary,
    Value,
};

/// A role a client peer can take on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerRole {
    // Calls RPC endpoints.
    Caller,
    // Registers RPC endpoints.
    Callee,
    // Publishes events to topics.
    Publisher,
}

impl PeerRole {
    /// The name of the role, as announced in HELLO.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Callee => "callee",
            Self::Publisher => "publisher",
        }
    }
}

impl Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the `roles` dictionary announced in HELLO details.
///
/// Each role maps to an empty feature dictionary.
pub fn roles_dictionary<'a, I>(roles: I) -> Dictionary
where
    I: IntoIterator<Item = &'a PeerRole>,
{
    Dictionary::from_iter(roles.into_iter().map(|role| {
        (
            role.name().to_owned(),
            Value::Dictionary(Dictionary::from_iter([(
                "features".to_owned(),
                Value::Dictionary(Dictionary::default()),
            )])),
        )
    }))
}

#[cfg(test)]
mod roles_test {
    use wamp_values::{
        Dictionary,
        Value,
    };

    use crate::core::roles::{
        PeerRole,
        roles_dictionary,
    };

    #[test]
    fn builds_roles_dictionary_in_order() {
        let roles = roles_dictionary(&[PeerRole::Caller, PeerRole::Publisher]);
        assert_eq!(
            roles.keys().map(String::as_str).collect::<Vec<_>>(),
            ["caller", "publisher"]
        );
        assert_eq!(
            roles.get("caller"),
            Some(&Value::Dictionary(Dictionary::from_iter([(
                "features".to_owned(),
                Value::Dictionary(Dictionary::default()),
            )])))
        );
    }
}
