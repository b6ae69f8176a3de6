//! Layer 1: Identity atoms
//!
//! TenantId, DocId, UserId: validated names supplied by clients
//! RoomKey: (tenant, doc) - selects one collaborative session
//! ProcessId: names one server process on the shared channel

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidId};

/// Upper bound on any client-supplied identifier, in bytes.
pub const MAX_ID_BYTES: usize = 256;

fn validate_name(raw: &str, allow_colon: bool) -> Result<(), String> {
    if raw.trim().is_empty() {
        return Err("empty".into());
    }
    if raw.len() > MAX_ID_BYTES {
        return Err(format!("longer than {MAX_ID_BYTES} bytes"));
    }
    if raw.chars().any(char::is_control) {
        return Err("contains control characters".into());
    }
    if !allow_colon && raw.contains(':') {
        return Err("cannot contain ':'".into());
    }
    Ok(())
}

/// Tenant identifier.
///
/// Rejects `:` so `tenant:doc` channel and storage names stay unambiguous.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        match validate_name(&s, false) {
            Ok(()) => Ok(Self(s)),
            Err(reason) => Err(InvalidId::Tenant { raw: s, reason }.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Document identifier within a tenant.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocId(String);

impl DocId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        match validate_name(&s, true) {
            Ok(()) => Ok(Self(s)),
            Err(reason) => Err(InvalidId::Doc { raw: s, reason }.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// User identifier - also the LWW tie-break key, compared byte-wise.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        match validate_name(&s, true) {
            Ok(()) => Ok(Self(s)),
            Err(reason) => Err(InvalidId::User { raw: s, reason }.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_id_impls {
    ($($ty:ident),*) => {$(
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($ty), "({:?})"), self.0)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = CoreError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                $ty::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(id: $ty) -> String {
                id.0
            }
        }
    )*};
}

string_id_impls!(TenantId, DocId, UserId);

/// Composite room identifier: one collaborative session per (tenant, doc).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomKey {
    pub tenant: TenantId,
    pub doc: DocId,
}

impl RoomKey {
    pub fn new(tenant: TenantId, doc: DocId) -> Self {
        Self { tenant, doc }
    }

    pub fn parse(tenant: &str, doc: &str) -> Result<Self, CoreError> {
        Ok(Self::new(TenantId::new(tenant)?, DocId::new(doc)?))
    }

    /// Pub/sub channel name for this room.
    pub fn channel(&self, prefix: &str) -> String {
        format!("{prefix}:{}:{}", self.tenant, self.doc)
    }

    /// Durable store key for this room's snapshot.
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{prefix}:{}:{}", self.tenant, self.doc)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.doc)
    }
}

/// Server process identity, carried on every published room event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(Uuid);

impl ProcessId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
