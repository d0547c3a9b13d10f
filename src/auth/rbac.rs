//! The RBAC surface this system actually needs: a single `admin` gate on
//! the handful of operator routes (full-refresh trigger, config reload).
//! Everything else is reachable by any authenticated — or, for read-only
//! sync endpoints, anonymous — client.

use crate::auth::{AuthError, Role};

/// Require the `admin` role, producing the same error the HTTP layer
/// reports as 403.
pub fn require_admin(role: Role) -> Result<(), AuthError> {
    match role {
        Role::Admin => Ok(()),
        Role::User => Err(AuthError::PermissionDenied("admin role required".to_string())),
    }
}
