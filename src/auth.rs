use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ApiError,
    models::{AccessTokenRecord, Role},
    repository::RepositoryState,
};

/// Issued tokens expire after 30 days.
const TOKEN_TTL_DAYS: i64 = 30;

/// Claims
///
/// The payload structure signed into every access token. The `jti` claim is
/// the primary key of the matching `access_tokens` row; a token whose row has
/// been deleted is revoked, no matter how much lifetime its `exp` has left.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the UUID of the user.
    pub sub: Uuid,
    /// Token id, resolved against the access-token store on every request.
    pub jti: Uuid,
    /// Expiration time. Tokens past this timestamp are rejected outright.
    pub exp: usize,
    /// Issued-at timestamp.
    pub iat: usize,
}

/// issue_token
///
/// Mints a signed access token for the user and records its `jti` in the
/// store so it can later be revoked by logout. Returns the encoded token.
pub async fn issue_token(
    config: &AppConfig,
    repo: &RepositoryState,
    user_id: Uuid,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let jti = Uuid::new_v4();

    let claims = Claims {
        sub: user_id,
        jti,
        exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("token encoding failed: {:?}", e);
        ApiError::internal()
    })?;

    repo.create_access_token(AccessTokenRecord {
        id: jti,
        user_id,
        created_at: now,
    })
    .await?;

    Ok(token)
}

/// decode_claims
///
/// Validates the signature and expiry of a presented token and returns its
/// claims. Shared by the extractor and by tests.
pub fn decode_claims(config: &AppConfig, token: &str) -> Result<Claims, ApiError> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|_| ApiError::unauthenticated())
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers use this
/// struct to read the caller's id and role; `token_id` identifies the session
/// so logout can revoke exactly the token that was presented.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub token_id: Uuid,
}

/// AuthUser Extractor Implementation
///
/// Implements Axum's FromRequestParts trait, making AuthUser usable as a
/// function argument in any authenticated handler, which keeps authentication
/// out of the business logic entirely.
///
/// Resolution order:
/// 1. Bearer token extraction from the Authorization header.
/// 2. Signature and expiry validation of the token.
/// 3. The `jti` must still exist in the access-token store (not revoked).
/// 4. The subject must resolve to a live user row. The lookup goes through
///    the visibility-filtered read, so a soft-deleted user's outstanding
///    tokens stop authenticating immediately.
///
/// Rejection: 401 with the `{"message":"Unauthenticated."}` body on any
/// failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(ApiError::unauthenticated)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(ApiError::unauthenticated)?;

        let claims = decode_claims(&config, token)?;

        // Revocation check: logout deletes the row, which invalidates the
        // token even though its signature and expiry are still good.
        repo.find_access_token(claims.jti)
            .await?
            .ok_or_else(ApiError::unauthenticated)?;

        // Final verification against the store. A user deleted after the
        // token was issued must not authenticate.
        let user = repo
            .find_user(claims.sub)
            .await?
            .ok_or_else(ApiError::unauthenticated)?;

        Ok(AuthUser {
            id: user.id,
            role: user.role,
            token_id: claims.jti,
        })
    }
}
