use crate::models::{
    AccessTokenRecord, Course, CourseStudent, Enrollment, EnrollmentStats, NewUser, Role, User,
    UserPatch,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// StoreError
///
/// The storage layer's failure taxonomy. `Conflict` covers every uniqueness
/// violation detected at write time (duplicate enrollment, duplicate email)
/// so handlers can translate it to a 409 or 422; everything else is an
/// unexpected database failure that must surface as an opaque 500.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conflicting write: uniqueness rule violated")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            _ => StoreError::Database(err),
        }
    }
}

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, allowing the
/// handlers to interact with the data layer without knowing the specific
/// implementation (Postgres, in-memory).
///
/// Soft-delete visibility is applied here, at the read boundary: `find_user`,
/// `find_user_by_email` and `list_users` see only live rows, while
/// `find_user_any` also returns soft-deleted users for the admin detail view.
/// No method ever exposes a password hash through a listing projection.
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn Repository>`) safely shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    /// Admin access: also returns soft-deleted rows.
    async fn find_user_any(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    /// Fails with `Conflict` when the email is already taken by a live user.
    /// The uniqueness check and the insert are a single constrained write.
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;
    /// Coalescing partial update; `None` fields keep their current value.
    /// Fails with `Conflict` when the new email collides with a live user.
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError>;
    /// Returns false when the user does not exist or is already deleted.
    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn enrollment_stats(&self, user_id: Uuid) -> Result<EnrollmentStats, StoreError>;

    // --- Courses ---
    async fn list_courses(&self) -> Result<Vec<Course>, StoreError>;
    async fn find_course(&self, id: Uuid) -> Result<Option<Course>, StoreError>;
    /// Joined projection of a course's enrolled users with their completion
    /// flag, in enrollment insertion order. Soft-deleted users are excluded.
    async fn course_students(&self, course_id: Uuid) -> Result<Vec<CourseStudent>, StoreError>;

    // --- Enrollments ---
    async fn find_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, StoreError>;
    /// Historical rows stay reachable by id even after the owning user is
    /// soft-deleted.
    async fn find_enrollment_by_id(&self, id: i64) -> Result<Option<Enrollment>, StoreError>;
    /// Fails with `Conflict` when an enrollment for the pair already exists.
    /// Race-safe: a single constrained insert, never check-then-insert.
    async fn create_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        enrolled_at: DateTime<Utc>,
    ) -> Result<Enrollment, StoreError>;
    /// Conditional null-to-timestamp transition. Returns false when the row
    /// is missing or already completed, which makes the write the arbiter
    /// between two concurrent completion requests.
    async fn complete_enrollment(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // --- Access Tokens ---
    async fn create_access_token(&self, record: AccessTokenRecord) -> Result<(), StoreError>;
    async fn find_access_token(&self, id: Uuid) -> Result<Option<AccessTokenRecord>, StoreError>;
    /// Returns false when the token was already revoked or never existed.
    async fn revoke_access_token(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the
/// PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at, deleted_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_any(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// create_user
    ///
    /// Single constrained insert against the partial unique index over live
    /// emails. Zero returned rows means the address is taken.
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, name, email, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (email) WHERE deleted_at IS NULL DO NOTHING \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role)
        .fetch_optional(&self.pool)
        .await?;

        user.ok_or(StoreError::Conflict)
    }

    /// update_user
    ///
    /// Uses COALESCE so only the provided fields change. A collision with the
    /// live-email index surfaces as a unique violation and maps to Conflict.
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET name = COALESCE($2, name), \
                 email = COALESCE($3, email), \
                 password_hash = COALESCE($4, password_hash) \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.password_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE users SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn enrollment_stats(&self, user_id: Uuid) -> Result<EnrollmentStats, StoreError> {
        // COUNT(completed_at) skips null values, giving the completed total.
        let stats = sqlx::query_as::<_, EnrollmentStats>(
            "SELECT COUNT(*) AS enrolled_courses, COUNT(completed_at) AS completed_courses \
             FROM enrollments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let courses = sqlx::query_as::<_, Course>(
            "SELECT id, title, description, created_at FROM courses ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(courses)
    }

    async fn find_course(&self, id: Uuid) -> Result<Option<Course>, StoreError> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT id, title, description, created_at FROM courses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(course)
    }

    /// course_students
    ///
    /// Ordered by enrollment id, which is the insertion order of the attach.
    async fn course_students(&self, course_id: Uuid) -> Result<Vec<CourseStudent>, StoreError> {
        let students = sqlx::query_as::<_, CourseStudent>(
            "SELECT u.name, u.email, (e.completed_at IS NOT NULL) AS completed \
             FROM enrollments e \
             JOIN users u ON u.id = e.user_id \
             WHERE e.course_id = $1 AND u.deleted_at IS NULL \
             ORDER BY e.id ASC",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(students)
    }

    async fn find_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, StoreError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            "SELECT id, user_id, course_id, enrolled_at, completed_at \
             FROM enrollments WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enrollment)
    }

    async fn find_enrollment_by_id(&self, id: i64) -> Result<Option<Enrollment>, StoreError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            "SELECT id, user_id, course_id, enrolled_at, completed_at \
             FROM enrollments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enrollment)
    }

    /// create_enrollment
    ///
    /// Uses `ON CONFLICT DO NOTHING` against the (user_id, course_id) unique
    /// constraint. Zero returned rows means the pair already exists, so two
    /// concurrent requests cannot both insert.
    async fn create_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        enrolled_at: DateTime<Utc>,
    ) -> Result<Enrollment, StoreError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(
            "INSERT INTO enrollments (user_id, course_id, enrolled_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, course_id) DO NOTHING \
             RETURNING id, user_id, course_id, enrolled_at, completed_at",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(enrolled_at)
        .fetch_optional(&self.pool)
        .await?;

        enrollment.ok_or(StoreError::Conflict)
    }

    /// complete_enrollment
    ///
    /// The `completed_at IS NULL` guard makes the transition happen at most
    /// once regardless of how many requests race on it.
    async fn complete_enrollment(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE enrollments SET completed_at = $2 WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_access_token(&self, record: AccessTokenRecord) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO access_tokens (id, user_id, created_at) VALUES ($1, $2, $3)")
            .bind(record.id)
            .bind(record.user_id)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_access_token(&self, id: Uuid) -> Result<Option<AccessTokenRecord>, StoreError> {
        let token = sqlx::query_as::<_, AccessTokenRecord>(
            "SELECT id, user_id, created_at FROM access_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn revoke_access_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- In-Memory Implementation ---

#[derive(Default)]
struct MemoryStore {
    users: Vec<User>,
    courses: Vec<Course>,
    enrollments: Vec<Enrollment>,
    tokens: Vec<AccessTokenRecord>,
    next_enrollment_id: i64,
}

/// MemoryRepository
///
/// A mutex-guarded in-memory implementation of `Repository` with the same
/// conflict semantics as the Postgres backend. Used by the integration test
/// harness and for running the service without a database. Every trait method
/// performs its check and write under one lock acquisition, so the atomicity
/// guarantees match the constrained SQL writes.
#[derive(Default)]
pub struct MemoryRepository {
    store: Mutex<MemoryStore>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a course. Courses have no API surface for creation, so tests and
    /// local setups provision them directly against the store.
    pub fn insert_course(&self, title: &str, description: &str) -> Course {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        let course = Course {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        store.courses.push(course.clone());
        course
    }

    /// Seeds a user directly, bypassing registration validation. Intended for
    /// test fixtures such as pre-provisioned admins.
    pub fn insert_user(&self, name: &str, email: &str, password_hash: &str, role: Role) -> User {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: Utc::now(),
            deleted_at: None,
        };
        store.users.push(user.clone());
        user
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store
            .users
            .iter()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_user_any(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store
            .users
            .iter()
            .find(|u| u.email == email && u.deleted_at.is_none())
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store
            .users
            .iter()
            .filter(|u| u.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        if store
            .users
            .iter()
            .any(|u| u.email == new.email && u.deleted_at.is_none())
        {
            return Err(StoreError::Conflict);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            created_at: Utc::now(),
            deleted_at: None,
        };
        store.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        if let Some(new_email) = &patch.email {
            if store
                .users
                .iter()
                .any(|u| u.id != id && u.email == *new_email && u.deleted_at.is_none())
            {
                return Err(StoreError::Conflict);
            }
        }
        let Some(user) = store
            .users
            .iter_mut()
            .find(|u| u.id == id && u.deleted_at.is_none())
        else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(password_hash) = patch.password_hash {
            user.password_hash = password_hash;
        }
        Ok(Some(user.clone()))
    }

    async fn soft_delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        match store
            .users
            .iter_mut()
            .find(|u| u.id == id && u.deleted_at.is_none())
        {
            Some(user) => {
                user.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn enrollment_stats(&self, user_id: Uuid) -> Result<EnrollmentStats, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        let rows: Vec<_> = store
            .enrollments
            .iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        Ok(EnrollmentStats {
            enrolled_courses: rows.len() as i64,
            completed_courses: rows.iter().filter(|e| e.completed_at.is_some()).count() as i64,
        })
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store.courses.clone())
    }

    async fn find_course(&self, id: Uuid) -> Result<Option<Course>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store.courses.iter().find(|c| c.id == id).cloned())
    }

    async fn course_students(&self, course_id: Uuid) -> Result<Vec<CourseStudent>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        // Enrollment ids are monotonic, so iteration order is insertion order.
        Ok(store
            .enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .filter_map(|e| {
                store
                    .users
                    .iter()
                    .find(|u| u.id == e.user_id && u.deleted_at.is_none())
                    .map(|u| CourseStudent {
                        name: u.name.clone(),
                        email: u.email.clone(),
                        completed: e.completed_at.is_some(),
                    })
            })
            .collect())
    }

    async fn find_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store
            .enrollments
            .iter()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned())
    }

    async fn find_enrollment_by_id(&self, id: i64) -> Result<Option<Enrollment>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store.enrollments.iter().find(|e| e.id == id).cloned())
    }

    async fn create_enrollment(
        &self,
        user_id: Uuid,
        course_id: Uuid,
        enrolled_at: DateTime<Utc>,
    ) -> Result<Enrollment, StoreError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        if store
            .enrollments
            .iter()
            .any(|e| e.user_id == user_id && e.course_id == course_id)
        {
            return Err(StoreError::Conflict);
        }
        store.next_enrollment_id += 1;
        let enrollment = Enrollment {
            id: store.next_enrollment_id,
            user_id,
            course_id,
            enrolled_at,
            completed_at: None,
        };
        store.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    async fn complete_enrollment(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        match store
            .enrollments
            .iter_mut()
            .find(|e| e.id == id && e.completed_at.is_none())
        {
            Some(enrollment) => {
                enrollment.completed_at = Some(completed_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_access_token(&self, record: AccessTokenRecord) -> Result<(), StoreError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        store.tokens.push(record);
        Ok(())
    }

    async fn find_access_token(&self, id: Uuid) -> Result<Option<AccessTokenRecord>, StoreError> {
        let store = self.store.lock().expect("memory store lock poisoned");
        Ok(store.tokens.iter().find(|t| t.id == id).cloned())
    }

    async fn revoke_access_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        let before = store.tokens.len();
        store.tokens.retain(|t| t.id != id);
        Ok(store.tokens.len() < before)
    }
}
