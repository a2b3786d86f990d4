//! Typed identifiers.
//!
//! Spec §3: "All identifiers are opaque 128-bit values except
//! `equipment_code` ... and `line_code`". Newtypes keep the various ids
//! from being interchangeable at the type level.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

uuid_id!(LineId);
uuid_id!(JobId);
uuid_id!(ScheduleId);
uuid_id!(ProductTypeId);
uuid_id!(UserId);
uuid_id!(DowntimeEventId);
uuid_id!(OeeReadingId);
uuid_id!(AndonEventId);
uuid_id!(ConnectionId);

/// Short ASCII string, unique per equipment (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EquipmentCode(pub String);

impl fmt::Display for EquipmentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EquipmentCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EquipmentCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Short ASCII string identifying a production line (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineCode(pub String);

impl fmt::Display for LineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LineCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
