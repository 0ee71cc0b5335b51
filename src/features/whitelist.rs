//! Substring-containment whitelist matching, shared by direct-message and
//! group-message checks in the automatic reply feature.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistMatch {
    pub is_allowed: bool,
    pub matched_identifier: Option<String>,
    pub matched_whitelist_entry: Option<String>,
}

impl WhitelistMatch {
    fn denied() -> Self {
        WhitelistMatch {
            is_allowed: false,
            matched_identifier: None,
            matched_whitelist_entry: None,
        }
    }
}

/// Returns the first `(identifier, whitelist_entry)` pair where `identifier`
/// contains `whitelist_entry` as a substring. Entry order is checked before
/// identifier order, matching how the whitelist is meant to be read top to
/// bottom as a priority list.
pub fn check(identifiers: &[&str], whitelist: &[String]) -> WhitelistMatch {
    if whitelist.is_empty() {
        return WhitelistMatch::denied();
    }

    for entry in whitelist {
        if entry.is_empty() {
            continue;
        }
        for identifier in identifiers {
            if !identifier.is_empty() && identifier.contains(entry.as_str()) {
                return WhitelistMatch {
                    is_allowed: true,
                    matched_identifier: Some(identifier.to_string()),
                    matched_whitelist_entry: Some(entry.clone()),
                };
            }
        }
    }

    WhitelistMatch::denied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_whitelist_denies() {
        let result = check(&["+15551234567"], &[]);
        assert!(!result.is_allowed);
    }

    #[test]
    fn exact_match_allows() {
        let whitelist = vec!["+15551234567".to_string()];
        let result = check(&["+15551234567"], &whitelist);
        assert!(result.is_allowed);
        assert_eq!(result.matched_whitelist_entry.as_deref(), Some("+15551234567"));
    }

    #[test]
    fn substring_match_allows() {
        let whitelist = vec!["5551234567".to_string()];
        let result = check(&["+15551234567@s.whatsapp.net"], &whitelist);
        assert!(result.is_allowed);
        assert_eq!(result.matched_identifier.as_deref(), Some("+15551234567@s.whatsapp.net"));
    }

    #[test]
    fn no_entry_matches_denies() {
        let whitelist = vec!["5559999999".to_string()];
        let result = check(&["+15551234567"], &whitelist);
        assert!(!result.is_allowed);
    }

    #[test]
    fn blank_entries_and_identifiers_are_skipped() {
        let whitelist = vec!["".to_string(), "1234".to_string()];
        let result = check(&["", "+15551234"], &whitelist);
        assert!(result.is_allowed);
        assert_eq!(result.matched_whitelist_entry.as_deref(), Some("1234"));
    }

    #[test]
    fn checks_multiple_identifiers() {
        let whitelist = vec!["Alice".to_string()];
        let result = check(&["+15551234567", "Alice Smith"], &whitelist);
        assert!(result.is_allowed);
        assert_eq!(result.matched_identifier.as_deref(), Some("Alice Smith"));
    }
}
