//! NewType wrappers for the identity fields carried in session tokens.
//!
//! These keep a subject id, a role and a client build string from being
//! swapped for one another at call sites that take several `&str`s.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// Identity of the account a token was issued to (the JWT `sub` claim).
    ///
    /// For the fleet backend this is the owner or driver account id.
    SubjectId
);

newtype_string!(
    /// Role granted to the subject, e.g. "owner", "driver", "admin".
    ///
    /// Carried unchanged from a refresh token into the renewed access token.
    Role
);

newtype_string!(
    /// Client build identifier sent in `x-app-version`.
    AppVersion
);

impl AppVersion {
    /// Parse an optional header value; blank values count as absent.
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }
}
