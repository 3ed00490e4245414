//! Request types

mod api_request;
mod method;

pub use api_request::{API_PREFIX, ApiRequest, RequestAuth, api_path};
pub use method::HttpMethod;
