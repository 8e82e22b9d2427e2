use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Declares a time-ordered UUID v7 identifier newtype.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generate a new time-ordered identifier (UUID v7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Short representation (first 8 characters of the UUID).
            pub fn short_id(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| TypeError::InvalidId {
                        value: s.to_string(),
                        reason: format!(concat!("not a ", $label, " id: {}"), e),
                    })
            }
        }
    };
}

uuid_id!(
    /// Stable identifier of a building entity, unique within a repository.
    EntityId,
    "entity"
);

uuid_id!(
    /// Identifier of a branch record. Names are mutable labels; ids are not.
    BranchId,
    "branch"
);

uuid_id!(
    /// Identifier of a repository (one per building model).
    RepositoryId,
    "repository"
);

/// Content-derived identifier of a commit.
///
/// A `CommitId` is the BLAKE3 hash of the commit's serialized content
/// (repository, parents, author, timestamp, message, kind, snapshot). Two
/// commits with identical content share an id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitId([u8; 32]);

impl CommitId {
    /// Compute a `CommitId` by hashing raw content bytes.
    pub fn from_content(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"strata-commit-v1:");
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }

    /// Create a `CommitId` from a pre-computed hash.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a full 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.short_hex())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The person or system acting on the repository.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Fallback actor used when no user is configured.
    pub const SYSTEM: &'static str = "system-user";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The built-in system actor.
    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
