mod error;
mod guard;
pub mod handlers;
mod helpers;
mod router;
mod session;
mod types;

pub use error::ApiError;
pub use guard::{authenticate, authorize, AuthUser, Authorized, RolePolicy, TeacherOnly};
pub use router::build_router;
pub use session::{issue_token, verify_token, Claims, SESSION_COOKIE};
pub use types::{AppState, Role};
