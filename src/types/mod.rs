//! Core value types shared by the client and its callers.

pub mod attempt;
pub mod operation;
pub mod rate_limit;

pub use attempt::AttemptContext;
pub use operation::{Operation, Variables};
pub use rate_limit::{RESET_BUFFER, RateLimitSnapshot};
