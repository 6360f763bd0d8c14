use crate::{
    AppState,
    auth::{AuthUser, issue_token},
    authz::{AccessDecision, UserOp, authorize},
    error::ApiError,
    models::{
        CourseDetailResponse, CourseSummary, CoursesResponse, LoginRequest, LoginResponse,
        MessageResponse, NewUser, RegisterRequest, Role, UpdateMeRequest, UserMessageResponse,
        UserPatch, UserResponse, UserWithStats, UsersListResponse, AccessGrant,
    },
    policy::{self, CompleteDecision, EnrollDecision},
    repository::StoreError,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

// --- Validation Helpers ---

/// Minimal structural check: a non-empty local part and domain separated by
/// a single '@', no whitespace. Anything stricter belongs to a mail round
/// trip, not a signup form.
fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > 255 || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::unprocessable("The name field is required"));
    }
    if name.len() > 255 {
        return Err(ApiError::unprocessable(
            "The name may not be greater than 255 characters",
        ));
    }
    Ok(())
}

fn validate_password(password: &str, confirmation: Option<&str>) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::unprocessable(
            "The password must be at least 8 characters",
        ));
    }
    if confirmation != Some(password) {
        return Err(ApiError::unprocessable(
            "The password confirmation does not match",
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| {
        tracing::error!("password hashing failed: {:?}", e);
        ApiError::internal()
    })
}

// --- Gateway Handlers ---

/// ping
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/ping",
    responses((status = 200, description = "Service is up", body = MessageResponse))
)]
pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse::new("API works!"))
}

/// register
///
/// [Public Route] Creates a new student account.
///
/// Every account created here carries the student role; administrators are
/// provisioned at the database level, never through this endpoint.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = UserMessageResponse),
        (status = 422, description = "Validation failed", body = MessageResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserMessageResponse>), ApiError> {
    validate_name(&payload.name)?;
    if !is_valid_email(&payload.email) {
        return Err(ApiError::unprocessable(
            "The email must be a valid email address",
        ));
    }
    validate_password(&payload.password, Some(&payload.password_confirmation))?;

    let password_hash = hash_password(&payload.password)?;

    // The uniqueness check lives in the constrained insert; a duplicate
    // surfaces as a validation failure, matching the form semantics.
    let user = match state
        .repo
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
            role: Role::Student,
        })
        .await
    {
        Ok(user) => user,
        Err(StoreError::Conflict) => {
            return Err(ApiError::unprocessable("The email has already been taken"));
        }
        Err(e) => return Err(e.into()),
    };

    Ok((
        StatusCode::CREATED,
        Json(UserMessageResponse {
            message: "User registered successfully".to_string(),
            user: UserResponse::from(&user),
        }),
    ))
}

/// login
///
/// [Public Route] Verifies credentials and issues an access token.
///
/// The email lookup goes through the visibility-filtered read, so a
/// soft-deleted account fails exactly like a nonexistent one.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = MessageResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .repo
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    let valid = bcrypt::verify(&payload.password, &user.password_hash).map_err(|e| {
        tracing::error!("password verification failed: {:?}", e);
        ApiError::internal()
    })?;
    if !valid {
        return Err(ApiError::invalid_credentials());
    }

    let token = issue_token(&state.config, &state.repo, user.id).await?;

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user: UserResponse::from(&user),
        access: AccessGrant {
            token,
            token_type: "Bearer".to_string(),
        },
    }))
}

/// logout
///
/// [Authenticated Route] Revokes the presented token. Other sessions of the
/// same user stay valid.
#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 200, description = "Logged out", body = MessageResponse))
)]
pub async fn logout(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.repo.revoke_access_token(auth.token_id).await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

// --- Profile Handlers ---

/// get_me
///
/// [Authenticated Route] The caller's own profile with enrollment counters.
#[utoipa::path(
    get,
    path = "/users/me",
    responses((status = 200, description = "Profile", body = UserWithStats))
)]
pub async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserWithStats>, ApiError> {
    let user = state
        .repo
        .find_user(auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let stats = state.repo.enrollment_stats(auth.id).await?;

    Ok(Json(UserWithStats {
        user: UserResponse::from(&user),
        stats,
    }))
}

/// update_me
///
/// [Authenticated Route] Patches the caller's own name, email or password.
/// Fields not present in the payload keep their current value.
#[utoipa::path(
    put,
    path = "/users/me",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Updated", body = UserMessageResponse),
        (status = 422, description = "Validation failed", body = MessageResponse)
    )
)]
pub async fn update_me(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<UserMessageResponse>, ApiError> {
    if let Some(name) = &payload.name {
        validate_name(name)?;
    }
    if let Some(email) = &payload.email {
        if !is_valid_email(email) {
            return Err(ApiError::unprocessable(
                "The email must be a valid email address",
            ));
        }
    }

    let password_hash = match &payload.password {
        Some(password) => {
            validate_password(password, payload.password_confirmation.as_deref())?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let patch = UserPatch {
        name: payload.name,
        email: payload.email,
        password_hash,
    };

    let user = match state.repo.update_user(auth.id, patch).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(ApiError::not_found("User not found")),
        Err(StoreError::Conflict) => {
            return Err(ApiError::unprocessable("The email has already been taken"));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(UserMessageResponse {
        message: "Profile updated successfully".to_string(),
        user: UserResponse::from(&user),
    }))
}

// --- User Administration Handlers ---

/// get_users
///
/// [Admin Route] Lists every live user together with their enrollment
/// counters. The authorization gate runs before any lookup, so a student
/// receives 403 no matter what exists.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = UsersListResponse),
        (status = 403, description = "Not an admin", body = MessageResponse)
    )
)]
pub async fn get_users(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UsersListResponse>, ApiError> {
    if authorize(&auth, None, UserOp::List) == AccessDecision::Forbidden {
        return Err(ApiError::forbidden());
    }

    let users = state.repo.list_users().await?;
    let mut data = Vec::with_capacity(users.len());
    for user in &users {
        let stats = state.repo.enrollment_stats(user.id).await?;
        data.push(UserWithStats {
            user: UserResponse::from(user),
            stats,
        });
    }

    Ok(Json(UsersListResponse { data }))
}

/// get_user_details
///
/// [Self-or-Admin Route] A single user's profile and counters. Admins may
/// inspect any user, including soft-deleted ones; students only themselves.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserWithStats),
        (status = 403, description = "Not self or admin", body = MessageResponse),
        (status = 404, description = "Unknown user", body = MessageResponse)
    )
)]
pub async fn get_user_details(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserWithStats>, ApiError> {
    if authorize(&auth, Some(id), UserOp::View) == AccessDecision::Forbidden {
        return Err(ApiError::forbidden());
    }

    let user = state
        .repo
        .find_user_any(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let stats = state.repo.enrollment_stats(user.id).await?;

    Ok(Json(UserWithStats {
        user: UserResponse::from(&user),
        stats,
    }))
}

/// delete_user
///
/// [Admin Route] Soft-deletes a user. The row is kept with a deletion marker;
/// authentication and listings hide it from then on, while enrollment history
/// stays intact.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not an admin", body = MessageResponse),
        (status = 404, description = "Unknown user", body = MessageResponse)
    )
)]
pub async fn delete_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    if authorize(&auth, Some(id), UserOp::Delete) == AccessDecision::Forbidden {
        return Err(ApiError::forbidden());
    }

    if !state.repo.soft_delete_user(id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    Ok(Json(MessageResponse::new("User deleted successfully")))
}

// --- Course Handlers ---

/// get_courses
///
/// [Authenticated Route] The course catalog. Visible to any authenticated
/// user; the projection carries no identifiers or enrollment data.
#[utoipa::path(
    get,
    path = "/courses",
    responses((status = 200, description = "Course catalog", body = CoursesResponse))
)]
pub async fn get_courses(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<CoursesResponse>, ApiError> {
    let courses = state.repo.list_courses().await?;
    Ok(Json(CoursesResponse {
        courses: courses.iter().map(CourseSummary::from).collect(),
    }))
}

/// get_course_details
///
/// [Authenticated Route] A course plus its student roster. Each student row
/// carries a completion flag; roster order is enrollment insertion order.
#[utoipa::path(
    get,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course detail", body = CourseDetailResponse),
        (status = 404, description = "Unknown course", body = MessageResponse)
    )
)]
pub async fn get_course_details(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let course = state
        .repo
        .find_course(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;
    let students = state.repo.course_students(course.id).await?;

    Ok(Json(CourseDetailResponse {
        course: CourseSummary::from(&course),
        students,
    }))
}

/// enroll_course
///
/// [Authenticated Route] Enrolls the caller in a course.
///
/// The policy check gives the friendly 409 for an already-known enrollment;
/// the constrained insert behind it decides races, so two concurrent requests
/// for the same pair cannot both succeed.
#[utoipa::path(
    post,
    path = "/courses/{id}/enroll",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Enrolled", body = MessageResponse),
        (status = 404, description = "Unknown course", body = MessageResponse),
        (status = 409, description = "Already enrolled", body = MessageResponse)
    )
)]
pub async fn enroll_course(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let course = state
        .repo
        .find_course(course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;

    let existing = state.repo.find_enrollment(auth.id, course.id).await?;
    if policy::can_enroll(auth.id, course.id, existing.as_ref()) == EnrollDecision::AlreadyEnrolled
    {
        return Err(ApiError::conflict("Already enrolled in this course"));
    }

    match state
        .repo
        .create_enrollment(auth.id, course.id, Utc::now())
        .await
    {
        Ok(_) => Ok(Json(MessageResponse::new("Successfully enrolled in course"))),
        // Lost the race against a concurrent enroll for the same pair.
        Err(StoreError::Conflict) => Err(ApiError::conflict("Already enrolled in this course")),
        Err(e) => Err(e.into()),
    }
}

/// complete_course
///
/// [Authenticated Route] Marks the caller's enrollment complete.
///
/// Completing without an enrollment yields 403, a mapping preserved from the
/// original API surface. Repeat completion yields 409, including when a
/// concurrent request wins the conditional write.
#[utoipa::path(
    patch,
    path = "/courses/{id}/completed",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Completed", body = MessageResponse),
        (status = 403, description = "Not enrolled", body = MessageResponse),
        (status = 404, description = "Unknown course", body = MessageResponse),
        (status = 409, description = "Already completed", body = MessageResponse)
    )
)]
pub async fn complete_course(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let course = state
        .repo
        .find_course(course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;

    let enrollment = state.repo.find_enrollment(auth.id, course.id).await?;
    let enrollment = match policy::can_complete(enrollment.as_ref()) {
        CompleteDecision::NotEnrolled => {
            return Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "Not enrolled in this course",
            ));
        }
        CompleteDecision::AlreadyCompleted => {
            return Err(ApiError::conflict("Course already completed"));
        }
        CompleteDecision::Allow => enrollment.expect("allow decision implies an enrollment"),
    };

    if !state
        .repo
        .complete_enrollment(enrollment.id, Utc::now())
        .await?
    {
        // A concurrent completion got there first.
        return Err(ApiError::conflict("Course already completed"));
    }

    Ok(Json(MessageResponse::new("Course completed")))
}
