// SPDX-FileCopyrightText: 2026 Kasuku Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword-based flow selection for callers with no active flow.
//!
//! Zero-cost heuristic lookup: exact match on the normalized message text,
//! including the numeric shortcuts from the home menu. Anything else falls
//! back to the home flow.

/// Flow every unmatched message lands on.
pub const DEFAULT_FLOW: &str = "home";

/// Keyword -> flow id. Exact match, case-insensitive.
const FLOW_KEYWORDS: &[(&str, &str)] = &[
    ("rides", "mobility"),
    ("ride", "mobility"),
    ("mobility", "mobility"),
    ("taxi", "mobility"),
    ("moto", "mobility"),
    ("insurance", "insurance"),
    ("cover", "insurance"),
    ("jobs", "jobs"),
    ("job", "jobs"),
    ("work", "jobs"),
    ("property", "property"),
    ("rent", "property"),
    ("house", "property"),
    ("wallet", "wallet"),
    ("balance", "wallet"),
    ("momo", "wallet"),
    ("marketplace", "marketplace"),
    ("buy", "marketplace"),
    ("sell", "marketplace"),
    // Numeric home-menu shortcuts.
    ("1", "mobility"),
    ("2", "insurance"),
    ("3", "jobs"),
    ("4", "property"),
    ("5", "wallet"),
    ("6", "marketplace"),
];

/// Look up the flow a message text starts, if any.
pub fn flow_for_text(text: &str) -> Option<&'static str> {
    let normalized = text.trim().to_lowercase();
    FLOW_KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == normalized)
        .map(|(_, flow)| *flow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_map_to_flows() {
        assert_eq!(flow_for_text("rides"), Some("mobility"));
        assert_eq!(flow_for_text("insurance"), Some("insurance"));
        assert_eq!(flow_for_text("jobs"), Some("jobs"));
        assert_eq!(flow_for_text("wallet"), Some("wallet"));
    }

    #[test]
    fn lookup_is_case_insensitive_and_trims() {
        assert_eq!(flow_for_text("  RIDES  "), Some("mobility"));
        assert_eq!(flow_for_text("Insurance"), Some("insurance"));
    }

    #[test]
    fn numeric_shortcuts_work() {
        assert_eq!(flow_for_text("1"), Some("mobility"));
        assert_eq!(flow_for_text("2"), Some("insurance"));
        assert_eq!(flow_for_text("6"), Some("marketplace"));
    }

    #[test]
    fn unmatched_text_returns_none() {
        assert_eq!(flow_for_text("hello there"), None);
        assert_eq!(flow_for_text(""), None);
        assert_eq!(flow_for_text("99"), None);
    }

    #[test]
    fn partial_match_does_not_route() {
        // "rides to town" is a sentence, not a menu keyword.
        assert_eq!(flow_for_text("rides to town"), None);
    }
}
