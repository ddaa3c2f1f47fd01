//! Structural address validation.
//!
//! This is the first and cheapest gate of the verification pipeline: a single
//! failed match short-circuits all network work for a candidate. The pattern
//! deliberately stays close to the "one `@`, restricted local part, dotted
//! domain" shape; full RFC 5321 parsing is not the goal here.

use std::sync::LazyLock;

use regex::Regex;

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$")
        .unwrap_or_else(|err| panic!("address pattern must compile: {err}"))
});

/// Returns `true` when `address` matches the structural pattern: exactly one
/// `@`, a non-empty local part drawn from `[A-Za-z0-9_.+-]`, and a domain
/// with at least two dot-separated labels.
pub fn is_valid_syntax(address: &str) -> bool {
    ADDRESS_RE.is_match(address.trim())
}

/// Splits a syntactically valid address into `(local, domain)`.
///
/// Returns `None` when the address does not contain exactly one `@`.
pub fn split_address(address: &str) -> Option<(&str, &str)> {
    let trimmed = address.trim();
    let (local, domain) = trimmed.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some((local, domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_basic() {
        assert!(is_valid_syntax("alice@example.com"));
        assert!(is_valid_syntax("a.b+tag@mail.example.co.uk"));
        assert!(is_valid_syntax("  padded@example.com  "));
    }

    #[test]
    fn rejects_embedded_space() {
        assert!(!is_valid_syntax("user@ex ample.com"));
    }

    #[test]
    fn rejects_structural_defects() {
        assert!(!is_valid_syntax(""));
        assert!(!is_valid_syntax("no-at-sign.example.com"));
        assert!(!is_valid_syntax("@example.com"));
        assert!(!is_valid_syntax("user@"));
        assert!(!is_valid_syntax("user@nodot"));
        assert!(!is_valid_syntax("a@b@example.com"));
    }

    #[test]
    fn split_requires_single_at() {
        assert_eq!(
            split_address("alice@example.com"),
            Some(("alice", "example.com"))
        );
        assert_eq!(split_address("alice"), None);
        assert_eq!(split_address("a@b@c"), None);
    }

    proptest! {
        #[test]
        fn generated_addresses_pass(
            local in "[A-Za-z0-9_+-]{1,16}(\\.[A-Za-z0-9_+-]{1,8}){0,2}",
            label in "[A-Za-z0-9]{1,12}",
            tld in "[A-Za-z]{2,6}",
        ) {
            let address = format!("{local}@{label}.{tld}");
            prop_assert!(is_valid_syntax(&address));
            prop_assert!(split_address(&address).is_some());
        }

        #[test]
        fn never_panics(input in "\\PC*") {
            let _ = is_valid_syntax(&input);
            let _ = split_address(&input);
        }
    }
}
