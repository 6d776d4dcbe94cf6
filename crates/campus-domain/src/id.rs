//! Newtype wrappers for domain identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Identifies a student account.
    StudentId
);

uuid_id!(
    /// Identifies an instructor account (the scanning party).
    InstructorId
);

uuid_id!(
    /// Identifies a scheduled class session owned by the scheduling service.
    ScheduleId
);

uuid_id!(
    /// Identifies one issuance of an attendance check-in code.
    AttendanceCodeId
);

impl AttendanceCodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttendanceCodeId {
    fn default() -> Self {
        Self::new()
    }
}
