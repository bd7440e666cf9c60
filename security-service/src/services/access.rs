//! Role based access control.
//!
//! Every role has a numeric level and every permission a minimum level; a
//! role holds a permission when its level reaches that minimum.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::Role;

impl Role {
    pub fn level(&self) -> u8 {
        match self {
            Role::Membro => 10,
            Role::Lider => 30,
            Role::Secretario => 50,
            Role::Tesoureiro => 60,
            Role::Pastor => 80,
            Role::Admin => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "member:read")]
    MemberRead,
    #[serde(rename = "member:write")]
    MemberWrite,
    #[serde(rename = "group:read")]
    GroupRead,
    #[serde(rename = "group:write")]
    GroupWrite,
    #[serde(rename = "event:read")]
    EventRead,
    #[serde(rename = "event:write")]
    EventWrite,
    #[serde(rename = "finance:read")]
    FinanceRead,
    #[serde(rename = "finance:write")]
    FinanceWrite,
    #[serde(rename = "user:read")]
    UserRead,
    #[serde(rename = "user:create")]
    UserCreate,
    #[serde(rename = "user:update")]
    UserUpdate,
    #[serde(rename = "user:delete")]
    UserDelete,
    #[serde(rename = "audit:read")]
    AuditRead,
    #[serde(rename = "security:monitor")]
    SecurityMonitor,
    #[serde(rename = "session:manage")]
    SessionManage,
    #[serde(rename = "settings:manage")]
    SettingsManage,
}

impl Permission {
    pub const ALL: [Permission; 16] = [
        Permission::MemberRead,
        Permission::MemberWrite,
        Permission::GroupRead,
        Permission::GroupWrite,
        Permission::EventRead,
        Permission::EventWrite,
        Permission::FinanceRead,
        Permission::FinanceWrite,
        Permission::UserRead,
        Permission::UserCreate,
        Permission::UserUpdate,
        Permission::UserDelete,
        Permission::AuditRead,
        Permission::SecurityMonitor,
        Permission::SessionManage,
        Permission::SettingsManage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::MemberRead => "member:read",
            Permission::MemberWrite => "member:write",
            Permission::GroupRead => "group:read",
            Permission::GroupWrite => "group:write",
            Permission::EventRead => "event:read",
            Permission::EventWrite => "event:write",
            Permission::FinanceRead => "finance:read",
            Permission::FinanceWrite => "finance:write",
            Permission::UserRead => "user:read",
            Permission::UserCreate => "user:create",
            Permission::UserUpdate => "user:update",
            Permission::UserDelete => "user:delete",
            Permission::AuditRead => "audit:read",
            Permission::SecurityMonitor => "security:monitor",
            Permission::SessionManage => "session:manage",
            Permission::SettingsManage => "settings:manage",
        }
    }

    pub fn min_level(&self) -> u8 {
        match self {
            Permission::MemberRead | Permission::GroupRead | Permission::EventRead => 10,
            Permission::GroupWrite | Permission::EventWrite => 30,
            Permission::MemberWrite | Permission::UserRead => 50,
            Permission::FinanceRead | Permission::FinanceWrite => 60,
            Permission::UserCreate | Permission::UserUpdate | Permission::AuditRead => 80,
            Permission::UserDelete
            | Permission::SecurityMonitor
            | Permission::SessionManage
            | Permission::SettingsManage => 100,
        }
    }

    /// Only the top role holds it.
    pub fn is_admin_only(&self) -> bool {
        self.min_level() >= Role::Admin.level()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}

/// Denied access. Names only what was required, never what the caller has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub required: Vec<Permission>,
    /// True when any one of `required` would have been enough
    pub any_of: bool,
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.required.iter().map(Permission::as_str).collect();
        if self.any_of && names.len() > 1 {
            write!(f, "Insufficient permissions: requires one of {}", names.join(", "))
        } else {
            write!(f, "Insufficient permissions: requires {}", names.join(", "))
        }
    }
}

impl std::error::Error for AccessDenied {}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    role.level() >= permission.min_level()
}

/// String form for callers holding raw claims. Unknown names never match.
pub fn has_permission_str(role: &str, permission: &str) -> bool {
    match (role.parse::<Role>(), permission.parse::<Permission>()) {
        (Ok(role), Ok(permission)) => has_permission(role, permission),
        _ => false,
    }
}

pub fn require_permission(role: Role, permission: Permission) -> Result<(), AccessDenied> {
    if has_permission(role, permission) {
        Ok(())
    } else {
        Err(AccessDenied {
            required: vec![permission],
            any_of: false,
        })
    }
}

/// An empty list is never satisfied.
pub fn require_any(role: Role, permissions: &[Permission]) -> Result<(), AccessDenied> {
    if permissions.iter().any(|p| has_permission(role, *p)) {
        Ok(())
    } else {
        Err(AccessDenied {
            required: permissions.to_vec(),
            any_of: true,
        })
    }
}

/// Reports the permissions still missing.
pub fn require_all(role: Role, permissions: &[Permission]) -> Result<(), AccessDenied> {
    let missing: Vec<Permission> = permissions
        .iter()
        .copied()
        .filter(|p| !has_permission(role, *p))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AccessDenied {
            required: missing,
            any_of: false,
        })
    }
}

/// Acting on one's own identity is always allowed.
pub fn require_self_or_permission(
    caller_id: &str,
    caller_role: Role,
    target_id: &str,
    permission: Permission,
) -> Result<(), AccessDenied> {
    if caller_id == target_id {
        return Ok(());
    }
    require_permission(caller_role, permission)
}

pub fn role_permissions_for(role: Role) -> Vec<Permission> {
    Permission::ALL
        .into_iter()
        .filter(|p| has_permission(role, *p))
        .collect()
}
