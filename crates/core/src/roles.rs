//! Well-known role names.
//!
//! These must match the `role` claim the auth service puts in session tokens.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_LIGHT_ADMIN: &str = "light_admin";
pub const ROLE_EMPLOYEE: &str = "employee";

/// The closed set of roles that may hold a real-time session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    LightAdmin,
    Employee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::LightAdmin => ROLE_LIGHT_ADMIN,
            Role::Employee => ROLE_EMPLOYEE,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_ADMIN => Ok(Role::Admin),
            ROLE_LIGHT_ADMIN => Ok(Role::LightAdmin),
            ROLE_EMPLOYEE => Ok(Role::Employee),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}
