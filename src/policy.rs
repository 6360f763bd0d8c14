use uuid::Uuid;

use crate::models::Enrollment;

/// Enrollment Policy Engine
///
/// Pure decision logic for the enrollment state machine. These functions are
/// handed the relevant entities by the caller and never touch storage, so the
/// state machine can be tested without HTTP or a database.
///
/// The decisions are advisory pre-checks: the storage layer's constrained
/// writes remain the arbiter under concurrency, and a lost race surfaces as
/// the same conflict the policy would have reported.

/// Outcome of asking whether a user may enroll in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollDecision {
    Allow,
    AlreadyEnrolled,
}

/// Outcome of asking whether an enrollment may be marked complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteDecision {
    Allow,
    NotEnrolled,
    AlreadyCompleted,
}

/// can_enroll
///
/// A user may enroll unless an enrollment for this exact (user, course) pair
/// already exists. An enrollment belonging to a different pair does not block.
pub fn can_enroll(
    user_id: Uuid,
    course_id: Uuid,
    existing: Option<&Enrollment>,
) -> EnrollDecision {
    match existing {
        Some(e) if e.user_id == user_id && e.course_id == course_id => {
            EnrollDecision::AlreadyEnrolled
        }
        _ => EnrollDecision::Allow,
    }
}

/// can_complete
///
/// Completion requires an in-progress enrollment. A missing enrollment yields
/// `NotEnrolled`; the caller looks the enrollment up by (user, course), so an
/// enrollment in some other course is indistinguishable from no enrollment at
/// all. A non-null `completed_at` yields `AlreadyCompleted`: the transition
/// happens exactly once.
pub fn can_complete(enrollment: Option<&Enrollment>) -> CompleteDecision {
    match enrollment {
        None => CompleteDecision::NotEnrolled,
        Some(e) if e.completed_at.is_some() => CompleteDecision::AlreadyCompleted,
        Some(_) => CompleteDecision::Allow,
    }
}
