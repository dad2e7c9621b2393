use serde::{Serialize, Serializer};
use std::fmt;

const SYSTEM_OWNER: &str = "system";
const USER_PREFIX: &str = "user:";

/// Who a job belongs to
///
/// Stored as a tagged string: `"system"` or `"user:<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Jobs not tied to an individual; every authenticated caller sees them
    System,
    User(String),
}

impl Owner {
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    pub fn to_db_string(&self) -> String {
        match self {
            Self::System => SYSTEM_OWNER.to_string(),
            Self::User(id) => format!("{}{}", USER_PREFIX, id),
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        if s == SYSTEM_OWNER {
            return Some(Self::System);
        }
        s.strip_prefix(USER_PREFIX)
            .filter(|id| !id.is_empty())
            .map(|id| Self::User(id.to_string()))
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_db_string())
    }
}

impl Serialize for Owner {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_db_string())
    }
}

/// The authenticated identity issuing a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    user_id: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The owner assigned to jobs this caller creates
    pub fn as_owner(&self) -> Owner {
        Owner::User(self.user_id.clone())
    }
}
