//! Response types

mod envelope;

pub use envelope::{ApiResponse, ResponseMetadata};
