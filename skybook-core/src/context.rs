use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor recorded on writes made by background work.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Staff,
    Customer,
}

string_enum!(Role {
    Admin => "ADMIN",
    Staff => "STAFF",
    Customer => "CUSTOMER",
});

/// Named authorization policies gating API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    AdminOnly,
    CustomerOrAdmin,
    AdminOrStaff,
}

impl Policy {
    pub fn allows(&self, role: Role) -> bool {
        match self {
            Policy::AdminOnly => role == Role::Admin,
            Policy::CustomerOrAdmin => matches!(role, Role::Customer | Role::Admin),
            Policy::AdminOrStaff => matches!(role, Role::Admin | Role::Staff),
        }
    }
}

/// Identity and clock of the request being served. Threaded explicitly into
/// every service call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: String,
    pub role: Role,
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            now,
        }
    }

    pub fn system(now: DateTime<Utc>) -> Self {
        Self::new(SYSTEM_ACTOR, Role::Admin, now)
    }

    /// Admins and staff may act on bookings they do not own.
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Staff)
    }

    pub fn can_act_for(&self, owner_id: &str) -> bool {
        self.is_privileged() || self.user_id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        assert!(Policy::AdminOnly.allows(Role::Admin));
        assert!(!Policy::AdminOnly.allows(Role::Staff));
        assert!(!Policy::AdminOnly.allows(Role::Customer));

        assert!(Policy::CustomerOrAdmin.allows(Role::Customer));
        assert!(Policy::CustomerOrAdmin.allows(Role::Admin));
        assert!(!Policy::CustomerOrAdmin.allows(Role::Staff));

        assert!(Policy::AdminOrStaff.allows(Role::Staff));
        assert!(!Policy::AdminOrStaff.allows(Role::Customer));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("STAFF".parse::<Role>().unwrap(), Role::Staff);
        assert!("PILOT".parse::<Role>().is_err());
    }

    #[test]
    fn test_ownership() {
        let ctx = RequestContext::new("user-1", Role::Customer, Utc::now());
        assert!(ctx.can_act_for("user-1"));
        assert!(!ctx.can_act_for("user-2"));
        assert!(RequestContext::system(Utc::now()).can_act_for("user-2"));
    }
}
