use uuid::Uuid;

use crate::{auth::AuthUser, models::Role};

/// Authorization Gate
///
/// Role-based access decisions for the user-management surface, expressed as
/// a single function over (principal, target, operation) instead of boolean
/// checks scattered through the handlers. Courses and enrollments are only
/// authentication-gated and never pass through here.

/// Operations on user profiles that require an authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOp {
    /// Read a profile.
    View,
    /// Modify a profile.
    Update,
    /// Enumerate all users.
    List,
    /// Soft-delete a user.
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Forbidden,
}

/// authorize
///
/// Two rules:
/// - Admins may perform every operation on every target.
/// - Students may View/Update only their own profile; List and Delete are
///   never granted to them.
///
/// `target` is `None` for collection-level operations (List).
pub fn authorize(principal: &AuthUser, target: Option<Uuid>, op: UserOp) -> AccessDecision {
    if principal.role == Role::Admin {
        return AccessDecision::Granted;
    }

    match op {
        UserOp::View | UserOp::Update if target == Some(principal.id) => AccessDecision::Granted,
        _ => AccessDecision::Forbidden,
    }
}
