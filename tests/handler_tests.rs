use axum::{Json, extract::Path, extract::State, http::StatusCode};
use chrono::Utc;
use course_portal::{
    AppState,
    auth::AuthUser,
    config::AppConfig,
    handlers,
    models::{
        LoginRequest, RegisterRequest, Role, UpdateMeRequest, User,
    },
    repository::{MemoryRepository, Repository},
};
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- Test Utilities ---

// Handlers depend on the Repository trait, so the in-memory implementation
// stands in for Postgres with identical conflict semantics.
fn test_state() -> (Arc<MemoryRepository>, AppState) {
    let repo = Arc::new(MemoryRepository::new());
    let state = AppState {
        repo: repo.clone(),
        config: AppConfig::default(),
    };
    (repo, state)
}

fn as_principal(user: &User) -> AuthUser {
    AuthUser {
        id: user.id,
        role: user.role,
        token_id: Uuid::new_v4(),
    }
}

fn seed_student(repo: &MemoryRepository, name: &str, email: &str) -> User {
    repo.insert_user(name, email, "unused-hash", Role::Student)
}

fn seed_admin(repo: &MemoryRepository) -> User {
    repo.insert_user("Admin", "admin@example.com", "unused-hash", Role::Admin)
}

fn register_payload(email: &str) -> RegisterRequest {
    RegisterRequest {
        name: "Teszt Elek".to_string(),
        email: email.to_string(),
        password: "Jelszo_2025".to_string(),
        password_confirmation: "Jelszo_2025".to_string(),
    }
}

// --- Registration ---

#[test]
async fn register_creates_student_account() {
    let (repo, state) = test_state();

    let result = handlers::register(State(state), Json(register_payload("teszt@example.com")))
        .await
        .expect("registration should succeed");

    let (status, Json(body)) = result;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.user.email, "teszt@example.com");
    assert_eq!(body.user.role, Role::Student);

    let stored = repo
        .find_user_by_email("teszt@example.com")
        .await
        .unwrap()
        .expect("user should be persisted");
    // Credentials are stored as a bcrypt hash, never as the plaintext.
    assert_ne!(stored.password_hash, "Jelszo_2025");
    assert!(bcrypt::verify("Jelszo_2025", &stored.password_hash).unwrap());
}

#[test]
async fn register_rejects_password_confirmation_mismatch() {
    let (_repo, state) = test_state();
    let mut payload = register_payload("teszt@example.com");
    payload.password_confirmation = "SomethingElse_2025".to_string();

    let err = handlers::register(State(state), Json(payload))
        .await
        .expect_err("mismatched confirmation must fail");
    assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err.message, "The password confirmation does not match");
}

#[test]
async fn register_rejects_short_password() {
    let (_repo, state) = test_state();
    let mut payload = register_payload("teszt@example.com");
    payload.password = "short".to_string();
    payload.password_confirmation = "short".to_string();

    let err = handlers::register(State(state), Json(payload)).await.unwrap_err();
    assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
async fn register_rejects_invalid_email() {
    let (_repo, state) = test_state();

    let err = handlers::register(State(state), Json(register_payload("not-an-email")))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err.message, "The email must be a valid email address");
}

#[test]
async fn register_rejects_duplicate_email() {
    let (_repo, state) = test_state();

    handlers::register(
        State(state.clone()),
        Json(register_payload("taken@example.com")),
    )
    .await
    .unwrap();

    let err = handlers::register(State(state), Json(register_payload("taken@example.com")))
        .await
        .expect_err("second registration with same email must fail");
    assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err.message, "The email has already been taken");
}

// --- Login ---

#[test]
async fn login_succeeds_with_valid_credentials() {
    let (_repo, state) = test_state();
    handlers::register(
        State(state.clone()),
        Json(register_payload("valid@example.com")),
    )
    .await
    .unwrap();

    let Json(body) = handlers::login(
        State(state),
        Json(LoginRequest {
            email: "valid@example.com".to_string(),
            password: "Jelszo_2025".to_string(),
        }),
    )
    .await
    .expect("login should succeed");

    assert_eq!(body.message, "Login successful");
    assert_eq!(body.user.email, "valid@example.com");
    assert!(!body.access.token.is_empty());
    assert_eq!(body.access.token_type, "Bearer");
}

#[test]
async fn login_rejects_wrong_password() {
    let (_repo, state) = test_state();
    handlers::register(
        State(state.clone()),
        Json(register_payload("existing@example.com")),
    )
    .await
    .unwrap();

    let err = handlers::login(
        State(state),
        Json(LoginRequest {
            email: "existing@example.com".to_string(),
            password: "wrongpass".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    assert_eq!(err.message, "Invalid email or password");
}

#[test]
async fn login_rejects_unknown_email_with_same_body() {
    let (_repo, state) = test_state();

    let err = handlers::login(
        State(state),
        Json(LoginRequest {
            email: "nobody@example.com".to_string(),
            password: "whatever-long".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    assert_eq!(err.message, "Invalid email or password");
}

#[test]
async fn login_rejects_soft_deleted_user() {
    let (repo, state) = test_state();
    let hash = bcrypt::hash("Jelszo_2025", bcrypt::DEFAULT_COST).unwrap();
    let user = repo.insert_user("Gone", "gone@example.com", &hash, Role::Student);
    repo.soft_delete_user(user.id).await.unwrap();

    let err = handlers::login(
        State(state),
        Json(LoginRequest {
            email: "gone@example.com".to_string(),
            password: "Jelszo_2025".to_string(),
        }),
    )
    .await
    .expect_err("deleted account must not authenticate");
    assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    assert_eq!(err.message, "Invalid email or password");
}

// --- Profile ---

#[test]
async fn me_reports_enrollment_counters() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");
    let course_a = repo.insert_course("Kurzus A", "Leiras A");
    let course_b = repo.insert_course("Kurzus B", "Leiras B");

    let e = repo
        .create_enrollment(user.id, course_a.id, Utc::now())
        .await
        .unwrap();
    repo.complete_enrollment(e.id, Utc::now()).await.unwrap();
    repo.create_enrollment(user.id, course_b.id, Utc::now())
        .await
        .unwrap();

    let Json(body) = handlers::get_me(as_principal(&user), State(state))
        .await
        .unwrap();
    assert_eq!(body.user.id, user.id);
    assert_eq!(body.stats.enrolled_courses, 2);
    assert_eq!(body.stats.completed_courses, 1);
}

#[test]
async fn update_me_patches_name_and_email() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Old Name", "old@example.com");

    let Json(body) = handlers::update_me(
        as_principal(&user),
        State(state),
        Json(UpdateMeRequest {
            name: Some("New Name".to_string()),
            email: Some("new@example.com".to_string()),
            ..UpdateMeRequest::default()
        }),
    )
    .await
    .expect("update should succeed");

    assert_eq!(body.message, "Profile updated successfully");
    assert_eq!(body.user.name, "New Name");
    assert_eq!(body.user.email, "new@example.com");

    let stored = repo.find_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "New Name");
    assert_eq!(stored.email, "new@example.com");
}

#[test]
async fn update_me_changes_password() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");

    handlers::update_me(
        as_principal(&user),
        State(state),
        Json(UpdateMeRequest {
            password: Some("New_Secure_Password_2025".to_string()),
            password_confirmation: Some("New_Secure_Password_2025".to_string()),
            ..UpdateMeRequest::default()
        }),
    )
    .await
    .unwrap();

    let stored = repo.find_user(user.id).await.unwrap().unwrap();
    assert!(bcrypt::verify("New_Secure_Password_2025", &stored.password_hash).unwrap());
}

#[test]
async fn update_me_requires_matching_confirmation() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");

    let err = handlers::update_me(
        as_principal(&user),
        State(state),
        Json(UpdateMeRequest {
            password: Some("New_Secure_Password_2025".to_string()),
            password_confirmation: None,
            ..UpdateMeRequest::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
async fn update_me_rejects_taken_email() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Egyik", "egyik@example.com");
    seed_student(&repo, "Masik", "masik@example.com");

    let err = handlers::update_me(
        as_principal(&user),
        State(state),
        Json(UpdateMeRequest {
            email: Some("masik@example.com".to_string()),
            ..UpdateMeRequest::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err.message, "The email has already been taken");
}

// --- User Administration ---

#[test]
async fn student_cannot_list_users() {
    let (repo, state) = test_state();
    let student = seed_student(&repo, "Diak", "diak@example.com");

    let err = handlers::get_users(as_principal(&student), State(state))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);
    assert_eq!(err.message, "Forbidden");
}

#[test]
async fn admin_lists_users_with_stats() {
    let (repo, state) = test_state();
    let admin = seed_admin(&repo);
    let student = seed_student(&repo, "Diak", "diak@example.com");
    let course = repo.insert_course("Kurzus", "Leiras");
    repo.create_enrollment(student.id, course.id, Utc::now())
        .await
        .unwrap();

    let Json(body) = handlers::get_users(as_principal(&admin), State(state))
        .await
        .unwrap();

    assert_eq!(body.data.len(), 2);
    let row = body
        .data
        .iter()
        .find(|r| r.user.id == student.id)
        .expect("student should be listed");
    assert_eq!(row.stats.enrolled_courses, 1);
    assert_eq!(row.stats.completed_courses, 0);
}

#[test]
async fn listing_excludes_soft_deleted_users() {
    let (repo, state) = test_state();
    let admin = seed_admin(&repo);
    let student = seed_student(&repo, "Torolt", "torolt@example.com");
    repo.soft_delete_user(student.id).await.unwrap();

    let Json(body) = handlers::get_users(as_principal(&admin), State(state))
        .await
        .unwrap();
    assert!(body.data.iter().all(|r| r.user.id != student.id));
}

#[test]
async fn student_cannot_view_other_users() {
    let (repo, state) = test_state();
    let student = seed_student(&repo, "Diak", "diak@example.com");
    let other = seed_student(&repo, "Masik", "masik@example.com");

    let err = handlers::get_user_details(as_principal(&student), State(state), Path(other.id))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);
    assert_eq!(err.message, "Forbidden");
}

#[test]
async fn student_can_view_own_profile_by_id() {
    let (repo, state) = test_state();
    let student = seed_student(&repo, "Diak", "diak@example.com");

    let Json(body) =
        handlers::get_user_details(as_principal(&student), State(state), Path(student.id))
            .await
            .unwrap();
    assert_eq!(body.user.id, student.id);
}

#[test]
async fn role_check_runs_before_resource_lookup() {
    let (repo, state) = test_state();
    let student = seed_student(&repo, "Diak", "diak@example.com");

    // The target does not exist; a student still sees 403, not 404.
    let err = handlers::get_user_details(
        as_principal(&student),
        State(state.clone()),
        Path(Uuid::new_v4()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    let err = handlers::delete_user(as_principal(&student), State(state), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);
}

#[test]
async fn student_cannot_delete_users() {
    let (repo, state) = test_state();
    let student = seed_student(&repo, "Diak", "diak@example.com");
    let target = seed_student(&repo, "Celpont", "celpont@example.com");

    let err = handlers::delete_user(as_principal(&student), State(state), Path(target.id))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    // The target is untouched.
    assert!(repo.find_user(target.id).await.unwrap().is_some());
}

#[test]
async fn admin_soft_deletes_a_user() {
    let (repo, state) = test_state();
    let admin = seed_admin(&repo);
    let target = seed_student(&repo, "Celpont", "celpont@example.com");

    let Json(body) = handlers::delete_user(as_principal(&admin), State(state), Path(target.id))
        .await
        .unwrap();
    assert_eq!(body.message, "User deleted successfully");

    // Hidden from the visibility-filtered read, still present underneath.
    assert!(repo.find_user(target.id).await.unwrap().is_none());
    let raw = repo.find_user_any(target.id).await.unwrap().unwrap();
    assert!(raw.deleted_at.is_some());
}

#[test]
async fn admin_still_sees_soft_deleted_user_details() {
    let (repo, state) = test_state();
    let admin = seed_admin(&repo);
    let target = seed_student(&repo, "Celpont", "celpont@example.com");
    let course = repo.insert_course("Kurzus", "Leiras");
    let enrollment = repo
        .create_enrollment(target.id, course.id, Utc::now())
        .await
        .unwrap();

    repo.soft_delete_user(target.id).await.unwrap();

    let Json(body) = handlers::get_user_details(as_principal(&admin), State(state), Path(target.id))
        .await
        .expect("admin must still see the deleted profile");
    assert_eq!(body.user.id, target.id);

    // Enrollment history survives the soft delete and stays reachable by id.
    let kept = repo
        .find_enrollment_by_id(enrollment.id)
        .await
        .unwrap()
        .expect("historical enrollment must remain queryable");
    assert_eq!(kept.user_id, target.id);
}

#[test]
async fn deleting_unknown_user_is_not_found() {
    let (repo, state) = test_state();
    let admin = seed_admin(&repo);

    let err = handlers::delete_user(as_principal(&admin), State(state), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

// --- Courses ---

#[test]
async fn course_listing_returns_summaries() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");
    repo.insert_course("Kurzus A", "Leiras A");
    repo.insert_course("Kurzus B", "Leiras B");
    repo.insert_course("Kurzus C", "Leiras C");

    let Json(body) = handlers::get_courses(as_principal(&user), State(state))
        .await
        .unwrap();
    assert_eq!(body.courses.len(), 3);
    assert_eq!(body.courses[0].title, "Kurzus A");
}

#[test]
async fn course_detail_of_unknown_course_is_not_found() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");

    let err =
        handlers::get_course_details(as_principal(&user), State(state), Path(Uuid::new_v4()))
            .await
            .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.message, "Course not found");
}

#[test]
async fn course_detail_lists_students_in_enrollment_order() {
    let (repo, state) = test_state();
    let viewer = seed_admin(&repo);
    let course = repo.insert_course("Reszletes Kurzus", "Reszletes Leiras");
    let student1 = seed_student(&repo, "Elso Diak", "elso@example.com");
    let student2 = seed_student(&repo, "Masodik Diak", "masodik@example.com");

    repo.create_enrollment(student1.id, course.id, Utc::now())
        .await
        .unwrap();
    let e2 = repo
        .create_enrollment(student2.id, course.id, Utc::now())
        .await
        .unwrap();
    repo.complete_enrollment(e2.id, Utc::now()).await.unwrap();

    let Json(body) = handlers::get_course_details(as_principal(&viewer), State(state), Path(course.id))
        .await
        .unwrap();

    assert_eq!(body.course.title, "Reszletes Kurzus");
    assert_eq!(body.students.len(), 2);
    // Positional flags: first enrollee in progress, second completed.
    assert_eq!(body.students[0].email, "elso@example.com");
    assert!(!body.students[0].completed);
    assert_eq!(body.students[1].email, "masodik@example.com");
    assert!(body.students[1].completed);
}

#[test]
async fn course_roster_hides_soft_deleted_students() {
    let (repo, state) = test_state();
    let viewer = seed_admin(&repo);
    let course = repo.insert_course("Kurzus", "Leiras");
    let student = seed_student(&repo, "Torolt", "torolt@example.com");
    repo.create_enrollment(student.id, course.id, Utc::now())
        .await
        .unwrap();
    repo.soft_delete_user(student.id).await.unwrap();

    let Json(body) = handlers::get_course_details(as_principal(&viewer), State(state), Path(course.id))
        .await
        .unwrap();
    assert!(body.students.is_empty());
}

// --- Enrollment Lifecycle ---

#[test]
async fn enroll_succeeds_once_and_conflicts_after() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");
    let course = repo.insert_course("Kurzus", "Leiras");

    let Json(body) =
        handlers::enroll_course(as_principal(&user), State(state.clone()), Path(course.id))
            .await
            .expect("first enrollment should succeed");
    assert_eq!(body.message, "Successfully enrolled in course");

    let err = handlers::enroll_course(as_principal(&user), State(state), Path(course.id))
        .await
        .expect_err("second enrollment must conflict");
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.message, "Already enrolled in this course");

    // Exactly one row exists for the pair.
    let stats = repo.enrollment_stats(user.id).await.unwrap();
    assert_eq!(stats.enrolled_courses, 1);
}

#[test]
async fn enroll_into_unknown_course_is_not_found() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");

    let err = handlers::enroll_course(as_principal(&user), State(state), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[test]
async fn complete_without_enrollment_is_forbidden() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");
    let course = repo.insert_course("Kurzus", "Leiras");

    let err = handlers::complete_course(as_principal(&user), State(state), Path(course.id))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);
    assert_eq!(err.message, "Not enrolled in this course");
}

#[test]
async fn complete_transitions_exactly_once() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");
    let course = repo.insert_course("Kurzus", "Leiras");

    handlers::enroll_course(as_principal(&user), State(state.clone()), Path(course.id))
        .await
        .unwrap();

    let Json(body) =
        handlers::complete_course(as_principal(&user), State(state.clone()), Path(course.id))
            .await
            .expect("completion should succeed");
    assert_eq!(body.message, "Course completed");

    let enrollment = repo
        .find_enrollment(user.id, course.id)
        .await
        .unwrap()
        .unwrap();
    assert!(enrollment.completed_at.is_some());

    let err = handlers::complete_course(as_principal(&user), State(state), Path(course.id))
        .await
        .expect_err("repeat completion must conflict");
    assert_eq!(err.status, StatusCode::CONFLICT);
    assert_eq!(err.message, "Course already completed");

    // The original timestamp is untouched by the failed attempt.
    let after = repo
        .find_enrollment(user.id, course.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.completed_at, enrollment.completed_at);
}

#[test]
async fn complete_on_unknown_course_is_not_found() {
    let (repo, state) = test_state();
    let user = seed_student(&repo, "Diak", "diak@example.com");

    let err = handlers::complete_course(as_principal(&user), State(state), Path(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}
