use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

/// Authenticated Router Module
///
/// Defines the routes accessible to any user who has passed the
/// authentication layer: session teardown, the caller's own profile, and the
/// whole course surface. None of these perform role checks; courses and
/// enrollments are visible to every authenticated user.
///
/// Every handler here relies on the `AuthUser` extractor middleware being
/// present on the router layer above this module, which guarantees a
/// validated identity before any handler body runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /logout
        // Revokes the token that authenticated this request.
        .route("/logout", post(handlers::logout))
        // GET/PUT /users/me
        // The caller's own profile: enrollment counters on read, partial
        // patch of name/email/password on write.
        .route(
            "/users/me",
            get(handlers::get_me).put(handlers::update_me),
        )
        // GET /courses
        // The course catalog.
        .route("/courses", get(handlers::get_courses))
        // GET /courses/{id}
        // Course detail with the enrolled-student roster and per-student
        // completion flags.
        .route("/courses/{id}", get(handlers::get_course_details))
        // POST /courses/{id}/enroll
        // Enrolls the caller. Duplicate enrollment for the same pair is a
        // 409, enforced by a constrained insert.
        .route("/courses/{id}/enroll", post(handlers::enroll_course))
        // PATCH /courses/{id}/completed
        // Marks the caller's enrollment complete, exactly once.
        .route("/courses/{id}/completed", patch(handlers::complete_course))
}
