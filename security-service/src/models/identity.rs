use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Congregation role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Membro,
    Lider,
    Secretario,
    Tesoureiro,
    Pastor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Membro,
        Role::Lider,
        Role::Secretario,
        Role::Tesoureiro,
        Role::Pastor,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Membro => "membro",
            Role::Lider => "lider",
            Role::Secretario => "secretario",
            Role::Tesoureiro => "tesoureiro",
            Role::Pastor => "pastor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Invalid role: {}", s))
    }
}

/// A person known to the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
}

/// Lowercase and trim an email so that lookups and counters agree.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
