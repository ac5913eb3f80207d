//! Authentication: password hashing, session tokens and the cookie-borne session.

pub mod password;
pub mod session;
pub mod token;

pub use password::{hash_password, verify_password};
pub use session::{Principal, SESSION_COOKIE};
pub use token::{Claims, TokenError, TokenService, TOKEN_TTL_SECS};
