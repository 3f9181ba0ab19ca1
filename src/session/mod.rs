//! User session and the institute → class → subject selection.

pub mod auth;
pub mod context;
pub mod model;
pub mod selection;

pub use auth::{AuthApi, INSTITUTES_TTL};
pub use context::SessionContext;
pub use model::{
    AuthUser, Child, Class, Credentials, Institute, LoginResponse, Organization, Subject, User,
    UserRole,
};
pub use selection::{Selection, SelectionState};
