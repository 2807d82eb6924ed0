//! Mine a raw query for tokens that look like code identifiers.
//!
//! The output feeds the exact-match and auxiliary keyword boosts, so it is
//! taken from the user's own words and never from expanded text.

use regex::Regex;
use scry_core::constants::MAX_IDENTIFIERS;
use std::collections::HashSet;
use std::sync::LazyLock;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier word regex must compile")
});

static DOTTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)+")
        .expect("dotted reference regex must compile")
});

static FILE_STEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[A-Za-z0-9_.\-]+/)*([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z]{1,5})\b")
        .expect("file path regex must compile")
});

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "pyi", "rs", "ts", "tsx", "js", "jsx", "mjs", "go", "java", "kt", "scala", "c", "h",
    "cc", "cpp", "hpp", "cs", "rb", "php", "swift", "md", "toml", "yaml", "yml", "json",
];

fn is_source_extension(ext: &str) -> bool {
    SOURCE_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
}

/// `parseData`, `HTMLParser`, `RuleL031`: a lowercase letter somewhere and an
/// uppercase letter after the first character.
fn is_camel_case(word: &str) -> bool {
    !word.contains('_')
        && word.chars().any(|c| c.is_ascii_lowercase())
        && word.chars().skip(1).any(|c| c.is_ascii_uppercase())
}

fn is_snake_case(word: &str) -> bool {
    let trimmed = word.trim_matches('_');
    trimmed.contains('_')
        && trimmed.chars().any(|c| c.is_ascii_lowercase())
        && trimmed.split('_').all(|part| !part.is_empty())
}

fn is_constant(word: &str) -> bool {
    word.contains('_')
        && word.chars().any(|c| c.is_ascii_uppercase())
        && word
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && word.split('_').all(|part| !part.is_empty())
}

/// Identifiers in order of first appearance, de-duplicated, at most
/// [`MAX_IDENTIFIERS`]. Plain prose yields an empty list.
pub fn extract_identifiers(query: &str) -> Vec<String> {
    let mut found: Vec<(usize, &str)> = Vec::new();

    for m in WORD_RE.find_iter(query) {
        let word = m.as_str();
        if is_camel_case(word) || is_snake_case(word) || is_constant(word) {
            found.push((m.start(), word));
        }
    }

    for m in DOTTED_RE.find_iter(query) {
        let dotted = m.as_str();
        let Some((_, last)) = dotted.rsplit_once('.') else {
            continue;
        };
        if is_source_extension(last) {
            continue;
        }
        found.push((m.start(), dotted));
        found.push((m.end() - last.len(), last));
    }

    for caps in FILE_STEM_RE.captures_iter(query) {
        let (Some(stem), Some(ext)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if is_source_extension(ext.as_str()) {
            found.push((stem.start(), stem.as_str()));
        }
    }

    found.sort_by_key(|(position, _)| *position);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, ident)| seen.insert(*ident))
        .take(MAX_IDENTIFIERS)
        .map(|(_, ident)| ident.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_query_yields_every_identifier_kind() {
        let ids = extract_identifiers(
            "Fix HTMLParser.parse_data in module.HTMLParser, check MAX_SIZE and L031.py",
        );
        for expected in ["HTMLParser", "parse_data", "module.HTMLParser", "MAX_SIZE", "L031"] {
            assert!(ids.iter().any(|id| id == expected), "missing {expected} in {ids:?}");
        }
        assert!(!ids.iter().any(|id| id == "L031.py"));
    }

    #[test]
    fn camel_case_forms() {
        let ids = extract_identifiers("See RuleL031 and DataProcessor, also parseConfig");
        assert_eq!(ids, vec!["RuleL031", "DataProcessor", "parseConfig"]);
    }

    #[test]
    fn snake_case_and_constants() {
        let ids = extract_identifiers("Call validate_user_input then raise DEFAULT_TIMEOUT_MS");
        assert_eq!(ids, vec!["validate_user_input", "DEFAULT_TIMEOUT_MS"]);
    }

    #[test]
    fn dotted_refs_include_last_component() {
        let ids = extract_identifiers("Use module.ClassName.method");
        assert!(ids.contains(&"module.ClassName.method".to_string()));
        assert!(ids.contains(&"method".to_string()));
        assert!(ids.contains(&"ClassName".to_string()));

        let ids = extract_identifiers("See os.path for details");
        assert_eq!(ids, vec!["os.path", "path"]);
    }

    #[test]
    fn file_paths_yield_stems() {
        assert_eq!(extract_identifiers("Check src/rules/handler.py"), vec!["handler"]);
        assert_eq!(extract_identifiers("Fix main.ts and utils.rs"), vec!["main", "utils"]);
    }

    #[test]
    fn prose_yields_nothing() {
        assert!(extract_identifiers("").is_empty());
        assert!(
            extract_identifiers("This is a bug where the thing does not work correctly").is_empty()
        );
    }

    #[test]
    fn duplicates_collapse_and_output_is_capped() {
        assert_eq!(extract_identifiers("FooBar FooBar FooBar"), vec!["FooBar"]);

        let many: Vec<String> = (0..30).map(|i| format!("func_{i}")).collect();
        let ids = extract_identifiers(&many.join(" "));
        assert_eq!(ids.len(), MAX_IDENTIFIERS);
        assert_eq!(ids[0], "func_0");
    }
}
