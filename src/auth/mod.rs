//! Authentication system
//!
//! Checks USER/PASS input against the single configured account and the
//! anonymous-login switch.

pub mod validator;

pub use validator::{ANONYMOUS_USER, UserOutcome, validate_password, validate_user};
