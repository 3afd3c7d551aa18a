pub mod aggregation;
pub mod redact;

pub use redact::{inject_token, redact};
