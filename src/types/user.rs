//! User-related types for the ledger server
//!
//! A user carries identity, credentials and profile. Its identifier doubles
//! as the identifier of the matching account record.

use super::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a user authenticates as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Employee,
    Manager,
    Administrator,
}

impl Role {
    /// Stable on-disk tag
    pub fn tag(self) -> u8 {
        match self {
            Role::Customer => 1,
            Role::Employee => 2,
            Role::Manager => 3,
            Role::Administrator => 4,
        }
    }

    /// Decode an on-disk tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Role::Customer),
            2 => Some(Role::Employee),
            3 => Some(Role::Manager),
            4 => Some(Role::Administrator),
            _ => None,
        }
    }

    /// Whether the role belongs to bank staff
    pub fn is_staff(self) -> bool {
        !matches!(self, Role::Customer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Customer => "customer",
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Administrator => "administrator",
        };
        f.write_str(name)
    }
}

/// Mutable profile fields of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub age: u32,
    pub address: String,
}

impl Profile {
    /// Profile given to customers created by an employee
    pub fn placeholder() -> Self {
        Profile {
            name: "New Client".to_string(),
            age: 30,
            address: "Pending Address".to_string(),
        }
    }
}

/// Stored user record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Identifier, `1 + position` in the users file
    pub id: RecordId,

    pub role: Role,

    pub username: String,

    /// bcrypt hash of the password
    pub password_hash: String,

    pub profile: Profile,
}

impl User {
    /// Public view of the user, without credentials
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            role: self.role,
            username: self.username.clone(),
            profile: self.profile.clone(),
        }
    }
}

/// User as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: RecordId,
    pub role: Role,
    pub username: String,
    pub profile: Profile,
}
