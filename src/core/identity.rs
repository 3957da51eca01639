//! Identity atoms.
//!
//! NodeId: stable identifier of the writing node, persisted at first use.
//! FileId: stable identifier per tracked path, assigned by the index.
//! LineId: unique per inserted line, never reused after deletion.
//! CommitId: assigned on commit creation.
//! StreamName: validated, filesystem-safe stream name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidId};

macro_rules! uuid_id {
    ($name:ident, $variant:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn parse(s: &str) -> Result<Self, CoreError> {
                let id = Uuid::parse_str(s).map_err(|e| InvalidId::$variant {
                    raw: s.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Self(id))
            }

            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// The 16 raw bytes, used by the binary op framing and for
            /// lexicographic tie-breaking.
            pub const fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uuid_id!(NodeId, Node, "Stable 128-bit identifier of a writing node.");
uuid_id!(FileId, File, "Stable 128-bit identifier of a tracked path.");
uuid_id!(LineId, Line, "Unique 128-bit identifier of an inserted line.");
uuid_id!(CommitId, Commit, "128-bit identifier assigned on commit creation.");

/// A named, append-only namespace of ops and commits.
///
/// Stream names become directory names under `.evo/ops/` and
/// `.evo/commits/`, so they must be non-empty and filesystem-safe.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamName(String);

impl StreamName {
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), CoreError> {
        let invalid = |reason: &str| {
            CoreError::from(InvalidId::Stream {
                raw: s.to_string(),
                reason: reason.to_string(),
            })
        };
        if s.is_empty() {
            return Err(invalid("empty"));
        }
        if s == "." || s == ".." {
            return Err(invalid("reserved path component"));
        }
        if s.bytes().any(|b| b == b'/' || b == b'\\' || b == 0) {
            return Err(invalid("contains path separator or NUL"));
        }
        Ok(())
    }
}

impl fmt::Debug for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamName({:?})", self.0)
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamName {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StreamName {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<StreamName> for String {
    fn from(name: StreamName) -> Self {
        name.0
    }
}
