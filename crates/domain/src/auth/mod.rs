//! Authentication domain types

mod credentials;
mod session;
mod token;
mod user;

pub use credentials::{AuthGrant, Credentials, LoginOutcome, MfaChallenge};
pub use session::{LogoutReason, Session, SessionPhase};
pub use token::{TokenClaims, TokenPair, token_preview};
pub use user::{Role, User, permissions};
