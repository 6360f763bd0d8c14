use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any
/// client: the liveness probe and the credential gateway. Everything else in
/// the API sits behind the authentication layer.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /ping
        // Monitoring endpoint. Answers immediately with a static body.
        .route("/ping", get(handlers::ping))
        // POST /register
        // New account creation. Always yields a student; admin accounts are
        // provisioned outside the API.
        .route("/register", post(handlers::register))
        // POST /login
        // Credential verification and token issuance.
        .route("/login", post(handlers::login))
}
