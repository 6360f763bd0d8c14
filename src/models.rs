use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Application Schemas (Mapped to Database) ---

/// Role
///
/// The RBAC field carried by every user row. Kept as an explicit enum rather
/// than a free-form string so authorization decisions cannot drift on typos.
/// Serialized in lowercase both in JSON payloads and in the `user_role`
/// Postgres enum type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema, TS,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Student,
    Admin,
}

/// User
///
/// The canonical identity record stored in the `users` table.
///
/// Deliberately does not implement `Serialize`: the `password_hash` column
/// must never reach a response body, so every payload goes through the
/// `UserResponse` projection instead.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    // Unique among non-deleted users.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    // Soft-delete marker. A non-null value hides the row from every
    // visibility-filtered read.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Course
///
/// A catalog entry. Immutable from the API's perspective; rows are provisioned
/// at the database level.
#[derive(Debug, Clone, FromRow, Default)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Enrollment
///
/// First-class join entity between User and Course, and the authoritative
/// record of the enrollment relationship. At most one row exists per
/// (user_id, course_id), enforced by the storage layer's unique constraint.
/// `completed_at` transitions from null to a timestamp exactly once.
#[derive(Debug, Clone, FromRow, Default)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// AccessTokenRecord
///
/// A live session token. The row's id is the `jti` claim of the issued JWT;
/// deleting the row revokes the token. Cascade-deleted with its user.
#[derive(Debug, Clone, FromRow)]
pub struct AccessTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// --- Repository Input Values ---

/// NewUser
///
/// Insert payload for `create_user`. The password arrives here already hashed;
/// the repository never sees plaintext credentials.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// UserPatch
///
/// Partial update for `update_user`. `None` fields keep their current value,
/// applied in a single coalescing write.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for the public registration endpoint (POST /register).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

/// LoginRequest
///
/// Input payload for POST /login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// UpdateMeRequest
///
/// Partial profile update for PUT /users/me. Any subset of the fields may be
/// supplied; a password change must carry a matching confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateMeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_confirmation: Option<String>,
}

// --- Response Projections (Output Schemas) ---

/// UserResponse
///
/// The public projection of a user. This is the only user shape that
/// serializes, so the password hash cannot leak through any endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// EnrollmentStats
///
/// Per-user enrollment counters. `enrolled_courses` counts every enrollment
/// row; `completed_courses` counts those with a non-null `completed_at`.
/// JSON keys are camelCase for compatibility with existing clients.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema, Default)]
#[ts(export)]
pub struct EnrollmentStats {
    #[serde(rename = "enrolledCourses")]
    pub enrolled_courses: i64,
    #[serde(rename = "completedCourses")]
    pub completed_courses: i64,
}

/// CourseSummary
///
/// The course projection used by both the listing and the detail endpoint.
/// Carries only the fields any authenticated caller may see.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema, Default)]
#[ts(export)]
pub struct CourseSummary {
    pub title: String,
    pub description: String,
}

impl From<&Course> for CourseSummary {
    fn from(course: &Course) -> Self {
        Self {
            title: course.title.clone(),
            description: course.description.clone(),
        }
    }
}

/// CourseStudent
///
/// One row of the course-detail student list: the enrolled user plus their
/// completion flag, ordered by enrollment insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, TS, ToSchema, Default)]
#[ts(export)]
pub struct CourseStudent {
    pub name: String,
    pub email: String,
    pub completed: bool,
}

// --- Response Envelopes ---

/// MessageResponse
///
/// Plain `{message}` body used by ping, logout, enroll, complete and delete.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// UserMessageResponse
///
/// `{message, user}` envelope returned by register and profile update.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserMessageResponse {
    pub message: String,
    pub user: UserResponse,
}

/// AccessGrant
///
/// The issued credential returned by login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AccessGrant {
    pub token: String,
    pub token_type: String,
}

/// LoginResponse
///
/// `{message, user, access}` envelope returned by a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserResponse,
    pub access: AccessGrant,
}

/// UserWithStats
///
/// `{user, stats}` pair used by the profile endpoint, the admin user detail
/// view and the admin listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserWithStats {
    pub user: UserResponse,
    pub stats: EnrollmentStats,
}

/// UsersListResponse
///
/// Admin listing envelope: `{data: [{user, stats}]}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UsersListResponse {
    pub data: Vec<UserWithStats>,
}

/// CoursesResponse
///
/// Course listing envelope: `{courses: [{title, description}]}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CoursesResponse {
    pub courses: Vec<CourseSummary>,
}

/// CourseDetailResponse
///
/// Course detail envelope: the course plus its student list with per-student
/// completion flags.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CourseDetailResponse {
    pub course: CourseSummary,
    pub students: Vec<CourseStudent>,
}
