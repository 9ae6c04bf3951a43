use serde::Serialize;

use super::domain::{UserAccount, UserId, UserRole};
use super::service::AdoptionError;

/// Authenticated caller, passed explicitly to every gated operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Session {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn for_account(account: &UserAccount) -> Self {
        Self::new(account.id.clone(), account.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_admin(&self) -> Result<(), AdoptionError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AdoptionError::Forbidden {
                reason: "admin role required",
            })
        }
    }

    pub fn can_access(&self, user_id: &UserId) -> bool {
        self.is_admin() || &self.user_id == user_id
    }

    pub fn require_access(&self, user_id: &UserId) -> Result<(), AdoptionError> {
        if self.can_access(user_id) {
            Ok(())
        } else {
            Err(AdoptionError::Forbidden {
                reason: "records belong to another user",
            })
        }
    }
}
