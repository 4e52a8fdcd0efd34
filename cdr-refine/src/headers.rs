//! Header normalization
//!
//! Source exports spell the same column many ways (`Crash ID`, `CRASH_ID`,
//! `Crash-ID`). Every header is mapped to a lower-case identifier made of
//! ASCII letters, digits and `_`, and collisions get numeric suffixes in
//! encounter order.

use std::collections::HashSet;

/// Canonical form of a single name, without collision handling
///
/// Also applied to column names in a refinement config so that config and
/// data agree on spelling.
pub fn canonicalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Raw header paired with its canonical name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMapping {
    pub raw: String,
    pub canonical: String,
}

/// Map raw headers to unique canonical names, preserving input order
pub fn normalize_headers<S: AsRef<str>>(headers: &[S]) -> Vec<HeaderMapping> {
    let bases: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let base = canonicalize(raw.as_ref());
            if base.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                base
            }
        })
        .collect();

    let mut taken: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut mappings = Vec::with_capacity(headers.len());

    for (raw, base) in headers.iter().zip(bases) {
        let canonical = if taken.contains(&base) {
            let mut suffix = 2;
            loop {
                let candidate = format!("{}_{}", base, suffix);
                if !taken.contains(&candidate) {
                    break candidate;
                }
                suffix += 1;
            }
        } else {
            base
        };

        taken.insert(canonical.clone());
        mappings.push(HeaderMapping {
            raw: raw.as_ref().to_string(),
            canonical,
        });
    }

    mappings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_identifier(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    fn canonical(headers: &[&str]) -> Vec<String> {
        normalize_headers(headers)
            .into_iter()
            .map(|m| m.canonical)
            .collect()
    }

    #[test]
    fn test_canonicalize_basic() {
        assert_eq!(canonicalize("Crash ID"), "crash_id");
        assert_eq!(canonicalize("  Hit and Run  "), "hit_and_run");
        assert_eq!(canonicalize("Crash--Date//Time"), "crash_date_time");
        assert_eq!(canonicalize("__lat__"), "lat");
        assert_eq!(canonicalize("Año"), "a_o");
        assert_eq!(canonicalize("###"), "");
    }

    #[test]
    fn test_collisions_get_distinct_suffixes() {
        let names = canonical(&["Crash ID", "crash id", "Crash-ID"]);
        assert_eq!(names, vec!["crash_id", "crash_id_2", "crash_id_3"]);
        assert!(names.iter().all(|n| is_identifier(n)));
    }

    #[test]
    fn test_suffix_skips_names_already_taken() {
        let names = canonical(&["a_2", "A", "a"]);
        assert_eq!(names, vec!["a_2", "a", "a_3"]);
    }

    #[test]
    fn test_empty_header_uses_position() {
        let names = canonical(&["id", "", "%%"]);
        assert_eq!(names, vec!["id", "column_2", "column_3"]);
    }

    #[test]
    fn test_preserves_raw_header() {
        let mappings = normalize_headers(&["Crash Date"]);
        assert_eq!(mappings[0].raw, "Crash Date");
        assert_eq!(mappings[0].canonical, "crash_date");
    }
}
