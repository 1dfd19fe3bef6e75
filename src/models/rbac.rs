//! Role and permission model
//!
//! A permission carries one rule `{ action, subject }`. Users collect rules
//! from their roles and from permissions granted to them directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subject that matches every entity
pub const SUBJECT_ALL: &str = "all";

/// Names of the roles the server keeps in sync at startup
pub struct SystemRoles;

impl SystemRoles {
    pub const USER: &'static str = "user";
    pub const SUPER_ADMIN: &'static str = "super-admin";
}

/// Permission granting `manage` on `all`
pub const SYSTEM_MANAGE: &str = "system-manage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Create,
    Read,
    Update,
    Delete,
    Manage,
    Owner,
}

impl fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionAction::Create => "create",
            PermissionAction::Read => "read",
            PermissionAction::Update => "update",
            PermissionAction::Delete => "delete",
            PermissionAction::Manage => "manage",
            PermissionAction::Owner => "owner",
        };
        f.write_str(s)
    }
}

impl FromStr for PermissionAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(PermissionAction::Create),
            "read" => Ok(PermissionAction::Read),
            "update" => Ok(PermissionAction::Update),
            "delete" => Ok(PermissionAction::Delete),
            "manage" => Ok(PermissionAction::Manage),
            "owner" => Ok(PermissionAction::Owner),
            _ => Err(anyhow::anyhow!("Invalid permission action: {}", s)),
        }
    }
}

/// What a permission allows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub action: PermissionAction,
    pub subject: String,
}

impl PermissionRule {
    pub fn new(action: PermissionAction, subject: impl Into<String>) -> Self {
        Self {
            action,
            subject: subject.into(),
        }
    }

    /// True when this rule covers `action` on `subject`
    pub fn allows(&self, action: PermissionAction, subject: &str) -> bool {
        let action_ok = self.action == action || self.action == PermissionAction::Manage;
        let subject_ok = self.subject == subject || self.subject == SUBJECT_ALL;
        action_ok && subject_ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Created by the startup sync; not editable through the API
    pub systemed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub rule: PermissionRule,
}

/// A role the startup sync creates or updates
#[derive(Debug, Clone)]
pub struct RoleDefinition {
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Permission names
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PermissionDefinition {
    pub name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub rule: PermissionRule,
}

/// Everything the startup sync writes
#[derive(Debug, Clone, Default)]
pub struct RbacDefinition {
    pub roles: Vec<RoleDefinition>,
    pub permissions: Vec<PermissionDefinition>,
}

/// What the startup sync changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub roles: usize,
    pub permissions: usize,
    pub removed_roles: u64,
    pub removed_permissions: u64,
    /// User promoted to super admin during this sync
    pub super_admin_assigned: Option<String>,
    /// Nobody held super admin and there was no user to promote
    pub super_admin_skipped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trips_through_str() {
        for action in [
            PermissionAction::Create,
            PermissionAction::Read,
            PermissionAction::Update,
            PermissionAction::Delete,
            PermissionAction::Manage,
            PermissionAction::Owner,
        ] {
            assert_eq!(action.to_string().parse::<PermissionAction>().unwrap(), action);
        }
        assert!("destroy".parse::<PermissionAction>().is_err());
    }

    #[test]
    fn test_rule_allows() {
        let owner = PermissionRule::new(PermissionAction::Owner, "Post");
        assert!(owner.allows(PermissionAction::Owner, "Post"));
        assert!(!owner.allows(PermissionAction::Owner, "Comment"));
        assert!(!owner.allows(PermissionAction::Create, "Post"));

        let manage_all = PermissionRule::new(PermissionAction::Manage, SUBJECT_ALL);
        assert!(manage_all.allows(PermissionAction::Delete, "Comment"));
        assert!(manage_all.allows(PermissionAction::Manage, "all"));

        let manage_post = PermissionRule::new(PermissionAction::Manage, "Post");
        assert!(manage_post.allows(PermissionAction::Owner, "Post"));
        assert!(!manage_post.allows(PermissionAction::Owner, "Comment"));
    }
}
