// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! String cleanup and qualified node labels
//!
//! Every node in the entity graph is addressed by a qualified label of the
//! form `TYPE==VALUE`. Both halves are normalized before they are joined so
//! the separator can never appear inside a value.

use regex::Regex;
use std::sync::LazyLock;

use crate::table::Cell;

/// Node type reserved for entity nodes
pub const ENTITY_LABEL: &str = "ENTITY";

/// Default separator between node type and value
pub const DEFAULT_ATTRIBUTE_SEPARATOR: &str = "==";

/// Default separator used when labels are merged into lists
pub const DEFAULT_LIST_SEPARATOR: &str = ";";

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s&@\+]").expect("valid regex"));

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Strip punctuation (keeping `&`, `@` and `+`), collapse whitespace and trim.
///
/// No case folding is applied. The function is idempotent.
pub fn normalize_text(text: &str) -> String {
    let stripped = DISALLOWED_CHARS.replace_all(text, "");
    WHITESPACE_RUNS.replace_all(&stripped, " ").trim().to_string()
}

/// True when every character of `separator` is removed by [`normalize_text`],
/// so it can never occur inside a normalized type or value.
pub fn is_valid_separator(separator: &str) -> bool {
    !separator.is_empty() && DISALLOWED_CHARS.replace_all(separator, "").is_empty()
}

/// Normalize a table cell, returning `None` for null or empty results
pub fn normalize_cell(cell: &Cell) -> Option<String> {
    let raw = cell.as_text()?;
    let normalized = normalize_text(&raw);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Join a node type and value into a qualified label
pub fn qualify(node_type: &str, value: &str, separator: &str) -> String {
    format!("{node_type}{separator}{value}")
}

/// Qualified label for an entity id
pub fn entity_label(entity_id: &str, separator: &str) -> String {
    qualify(ENTITY_LABEL, entity_id, separator)
}

/// Split a qualified label into `(type, value)`.
///
/// Labels without a separator are treated as bare values with an empty type.
pub fn split_label<'a>(label: &'a str, separator: &str) -> (&'a str, &'a str) {
    match label.split_once(separator) {
        Some((node_type, value)) => (node_type, value),
        None => ("", label),
    }
}

/// Accept either a bare entity id or an already qualified entity label
pub fn to_entity_label(entity: &str, separator: &str) -> String {
    let prefix = format!("{ENTITY_LABEL}{separator}");
    if entity.starts_with(&prefix) {
        entity.to_string()
    } else {
        entity_label(&normalize_text(entity), separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_separator_must_be_stripped_by_normalizer() {
        assert!(is_valid_separator("=="));
        assert!(is_valid_separator(";"));
        assert!(is_valid_separator("|"));
        assert!(!is_valid_separator("__"));
        assert!(!is_valid_separator(" "));
        assert!(!is_valid_separator("=+"));
        assert!(!is_valid_separator(""));
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize_text("555-1"), "5551");
        assert_eq!(normalize_text("  Plus   One, Inc. "), "Plus One Inc");
        assert_eq!(normalize_text("a&b @c +d"), "a&b @c +d");
        assert_eq!(normalize_text("x==y"), "xy");
    }

    #[test]
    fn test_normalize_keeps_case_and_unicode_words() {
        assert_eq!(normalize_text("Zoë\tMÜLLER"), "Zoë MÜLLER");
    }

    #[test]
    fn test_normalize_cell_skips_empty() {
        assert_eq!(normalize_cell(&Cell::Null), None);
        assert_eq!(normalize_cell(&Cell::from("--")), None);
        assert_eq!(normalize_cell(&Cell::Int(42)), Some("42".to_string()));
        assert_eq!(normalize_cell(&Cell::Float(7.0)), Some("7".to_string()));
    }

    #[test]
    fn test_split_label() {
        assert_eq!(split_label("phone==5551", "=="), ("phone", "5551"));
        assert_eq!(split_label("bare", "=="), ("", "bare"));
    }

    #[test]
    fn test_to_entity_label() {
        assert_eq!(to_entity_label("A", "=="), "ENTITY==A");
        assert_eq!(to_entity_label("ENTITY==A", "=="), "ENTITY==A");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_fixed_point(s in "\\PC{0,40}") {
            let once = normalize_text(&s);
            prop_assert_eq!(normalize_text(&once), once.clone());
            prop_assert!(!once.contains("=="));
        }
    }
}
