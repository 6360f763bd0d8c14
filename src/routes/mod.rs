/// Router Module Index
///
/// Organizes the application's routing logic into security-segregated modules
/// so access control is applied explicitly at the module level. The three
/// modules map directly to the defined access roles.

/// Routes accessible without credentials: the liveness probe and the
/// register/login gateway.
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware.
/// Requires a validated user session.
pub mod authenticated;

/// Routes for user administration. Authentication comes from the shared
/// middleware layer; the admin/self authorization decision is made inside the
/// handlers through the authorization gate.
pub mod admin;
