//! ID generation utilities.

use uuid::Uuid;

/// Header carrying the per-request identifier.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Generates a new request identifier.
///
/// UUID v7 embeds a timestamp, so ids sort by creation time in server logs.
#[must_use]
pub fn generate_request_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 36);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_request_id_uniqueness() {
        assert_ne!(generate_request_id(), generate_request_id());
    }
}
