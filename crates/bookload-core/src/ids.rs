//! Identifier types for bookload.
//!
//! Customer, booking and booking-type identifiers come from upstream systems as
//! free-form strings. They are validated once on construction: non-empty and free of
//! NUL bytes, which the storage layer uses as a key separator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create an identifier, validating its contents.
            ///
            /// # Errors
            ///
            /// Returns `IdError` if the value is empty or contains a NUL byte.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                validate(&value)?;
                Ok(Self(value))
            }

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

string_id!(
    /// A customer identifier, the natural key of the dimension table.
    CustomerId
);

string_id!(
    /// A booking identifier, unique per booking within a batch.
    BookingId
);

string_id!(
    /// A booking type such as `flight` or `hotel`.
    BookingType
);

string_id!(
    /// Identifies one run of the engine over one batch.
    ///
    /// Daily batches are usually identified by their date (`2024-02-01`), which keeps
    /// the id stable when the same batch is re-run.
    RunId
);

impl RunId {
    /// Generate a fresh time-ordered run ID for ad-hoc runs.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}

fn validate(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if value.contains('\0') {
        return Err(IdError::InvalidCharacter);
    }
    Ok(())
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is empty.
    #[error("identifier must not be empty")]
    Empty,

    /// The input contains a NUL byte.
    #[error("identifier must not contain NUL bytes")]
    InvalidCharacter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_id_roundtrip() {
        let id = CustomerId::new("C1").unwrap();
        let parsed = CustomerId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(format!("{id:?}"), "CustomerId(C1)");
    }

    #[test]
    fn booking_type_serde_json() {
        let id = BookingType::new("flight").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"flight\"");
        let parsed: BookingType = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_empty_and_nul() {
        assert_eq!(CustomerId::new(""), Err(IdError::Empty));
        assert_eq!(BookingId::new("a\0b"), Err(IdError::InvalidCharacter));
        assert!(serde_json::from_str::<RunId>("\"\"").is_err());
    }

    #[test]
    fn generated_run_ids_are_distinct() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }
}
