//! Role-based permissions
//!
//! A declarative `{role: {capability: bool}}` table, loaded from configuration
//! or built in code, consulted once per render to decide which row actions and
//! toolbar buttons a role sees.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Something a role may be allowed to do on a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    View,
    Create,
    Edit,
    Delete,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::View,
        Capability::Create,
        Capability::Edit,
        Capability::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Create => "create",
            Capability::Edit => "edit",
            Capability::Delete => "delete",
        }
    }
}

/// Capabilities resolved for one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub view: bool,
    pub create: bool,
    pub edit: bool,
    pub delete: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Capabilities {
            view: true,
            create: true,
            edit: true,
            delete: true,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::View => self.view,
            Capability::Create => self.create,
            Capability::Edit => self.edit,
            Capability::Delete => self.delete,
        }
    }

    /// True if any per-row action (view/edit/delete) is available
    pub fn any_row_action(&self) -> bool {
        self.view || self.edit || self.delete
    }
}

/// Role -> capability table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionTable {
    roles: HashMap<String, HashMap<Capability, bool>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default pharmacy roles: admins do everything, pharmacists manage
    /// records but cannot delete, cashiers can look up and register.
    pub fn pharmacy_defaults() -> Self {
        PermissionTable::new()
            .grant("admin", &Capability::ALL)
            .grant(
                "pharmacist",
&[Capability::View, Capability::Create, Capability::Edit],
            )
            .grant("cashier", &[Capability::View, Capability::Create])
    }

    pub fn grant(mut self, role: impl Into<String>, capabilities: &[Capability]) -> Self {
        let entry = self.roles.entry(role.into()).or_default();
        for c in capabilities {
            entry.insert(*c, true);
        }
        self
    }

    pub fn deny(mut self, role: impl Into<String>, capability: Capability) -> Self {
        self.roles.entry(role.into()).or_default().insert(capability, false);
        self
    }

    /// Role names are matched case-insensitively. Unknown roles and unlisted
    /// capabilities are denied.
    pub fn allows(&self, role: &str, capability: Capability) -> bool {
        self.lookup(role)
            .and_then(|caps| caps.get(&capability).copied())
            .unwrap_or(false)
    }

    pub fn capabilities_for(&self, role: &str) -> Capabilities {
        Capabilities {
            view: self.allows(role, Capability::View),
            create: self.allows(role, Capability::Create),
            edit: self.allows(role, Capability::Edit),
            delete: self.allows(role, Capability::Delete),
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(|k| k.as_str())
    }

    fn lookup(&self, role: &str) -> Option<&HashMap<Capability, bool>> {
        self.roles.get(role).or_else(|| {
            self.roles
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(role))
                .map(|(_, v)| v)
        })
    }
}
