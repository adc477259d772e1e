//! Identifier utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_v4() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 4);
    }
}
