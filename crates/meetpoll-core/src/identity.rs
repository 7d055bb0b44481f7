//! Participant identity handling.
//!
//! Identities are email addresses compared case-insensitively. Everything that
//! stores or compares an identity goes through [`normalize_identity`].

/// Trim and lowercase an email-style identity.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Case-insensitive identity comparison.
pub fn same_identity(a: &str, b: &str) -> bool {
    normalize_identity(a) == normalize_identity(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_identity("  Alice@Example.COM "), "alice@example.com");
        assert!(same_identity("BOB@example.com", "bob@EXAMPLE.com"));
        assert!(!same_identity("bob@example.com", "rob@example.com"));
    }
}
