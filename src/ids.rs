use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The stable, string-valued tenant identifier carried on the tenant header
/// and on SSE query parameters. Distinct from a tenant's surrogate row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        TenantId(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        TenantId(value)
    }
}

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                $name(value)
            }
        }
    };
}

uuid_id!(FingerprintId);
uuid_id!(SessionId);
uuid_id!(VisitId);
uuid_id!(LeadId);
uuid_id!(StoryFragmentId);
uuid_id!(PaneId);
uuid_id!(NodeId);
uuid_id!(ContentId);

/// A pane-rendering variant descriptor (e.g. device class, A/B arm).
/// Opaque to the cache; callers decide what distinguishes two variants
/// of the same pane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variant(pub String);

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant("default".to_string())
    }
}

/// An hour-aligned bucket key for analytics bins, e.g. "2026-08-01T14".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HourKey(pub String);

impl fmt::Display for HourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl HourKey {
    /// The bucket the current instant falls into, in UTC.
    pub fn current() -> Self {
        HourKey(chrono::Utc::now().format("%Y-%m-%dT%H").to_string())
    }

    /// Parses an hour key back into the UTC instant it names, for
    /// TTL-based analytics retention (spec §4.6).
    pub fn parsed(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::NaiveDateTime::parse_from_str(&format!("{}:00:00", self.0), "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
