//! Request id generation.
//!
//! `x-request-id` is echoed when the caller supplies one; otherwise the
//! gateway generates a 40-character id (a UUIDv7 with its hyphens
//! stripped, zero-padded) so ids stay roughly time-ordered.

use uuid::Uuid;

/// Generate a 40-character request id.
#[must_use]
pub fn generate_request_id() -> String {
    let raw = Uuid::now_v7().simple().to_string();
    format!("{raw:0<40}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_is_40_chars() {
        let id = generate_request_id();
        assert_eq!(id.len(), 40);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
    }
}
