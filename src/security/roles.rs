use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Account roles, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Subscriber,
    Author,
    Editor,
    Admin,
}

/// Lowercase role names as stored.
pub const ROLE_NAMES: &[&str] = &["subscriber", "author", "editor", "admin"];

/// Capabilities checked by handlers and guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Create and edit posts/projects the user authored
    WriteOwnContent,
    /// Edit or delete anyone's posts/projects
    WriteAnyContent,
    /// Set content status to `published`
    Publish,
    ModerateComments,
    /// Homepage sections, services, categories
    ManageSite,
    ReadInbox,
    UploadMedia,
    DeleteMedia,
    ManageUsers,
    ViewActivity,
    ViewAnalytics,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Subscriber => "subscriber",
            Role::Author => "author",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Role::Subscriber => 0,
            Role::Author => 1,
            Role::Editor => 2,
            Role::Admin => 3,
        }
    }

    pub fn at_least(&self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    pub fn permits(&self, permission: Permission) -> bool {
        use Permission::*;
        match permission {
            WriteOwnContent | UploadMedia => self.at_least(Role::Author),
            WriteAnyContent | Publish | ModerateComments | ManageSite | ReadInbox
            | DeleteMedia | ViewAnalytics => self.at_least(Role::Editor),
            ManageUsers | ViewActivity => *self == Role::Admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subscriber" => Ok(Role::Subscriber),
            "author" => Ok(Role::Author),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_ignores_case() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Editor".parse::<Role>().unwrap(), Role::Editor);
        assert_eq!(" author ".parse::<Role>().unwrap(), Role::Author);
        assert!("superuser".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn names_round_trip_lowercase() {
        for name in ROLE_NAMES {
            assert_eq!(name.parse::<Role>().unwrap().as_str(), *name);
        }
    }

    #[test]
    fn hierarchy_orders_roles() {
        assert!(Role::Admin.at_least(Role::Editor));
        assert!(Role::Editor.at_least(Role::Author));
        assert!(Role::Author.at_least(Role::Subscriber));
        assert!(!Role::Author.at_least(Role::Editor));
        assert!(Role::Subscriber < Role::Admin);
    }

    #[test]
    fn permissions_follow_rank() {
        assert!(Role::Author.permits(Permission::WriteOwnContent));
        assert!(!Role::Author.permits(Permission::Publish));
        assert!(!Role::Author.permits(Permission::WriteAnyContent));
        assert!(Role::Editor.permits(Permission::Publish));
        assert!(Role::Editor.permits(Permission::ModerateComments));
        assert!(!Role::Editor.permits(Permission::ManageUsers));
        assert!(!Role::Editor.permits(Permission::ViewActivity));
        assert!(Role::Admin.permits(Permission::ManageUsers));
        assert!(!Role::Subscriber.permits(Permission::UploadMedia));
    }

    #[test]
    fn guard_minimums_grant_their_route_permissions() {
        use Permission::*;
        let editor_routes = [ManageSite, ModerateComments, ReadInbox, ViewAnalytics, DeleteMedia];
        for p in editor_routes {
            assert!(Role::Editor.permits(p), "{:?}", p);
            assert!(!Role::Author.permits(p), "{:?}", p);
        }
        for p in [ManageUsers, ViewActivity] {
            assert!(Role::Admin.permits(p), "{:?}", p);
            assert!(!Role::Editor.permits(p), "{:?}", p);
        }
        for p in [WriteOwnContent, UploadMedia] {
            assert!(Role::Author.permits(p), "{:?}", p);
            assert!(!Role::Subscriber.permits(p), "{:?}", p);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Role::Editor).unwrap(), "\"editor\"");
        let role: Role = serde_json::from_str("\"AUTHOR\"").unwrap();
        assert_eq!(role, Role::Author);
    }
}
