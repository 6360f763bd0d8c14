use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get},
};

/// Admin Router Module
///
/// User-management routes. They share the authentication middleware with the
/// authenticated module; the role decision itself is made inside the handlers
/// through the authorization gate, because GET /users/{id} is self-or-admin
/// rather than strictly admin-only.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users
        // Lists every live user with enrollment counters. Admin only.
        .route("/users", get(handlers::get_users))
        // GET /users/{id}
        // A single user with counters. Self or admin; admins also see
        // soft-deleted users.
        // DELETE /users/{id}
        // Soft-deletes the target. Admin only.
        .route(
            "/users/{id}",
            get(handlers::get_user_details).delete(handlers::delete_user),
        )
}
