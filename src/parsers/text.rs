//! String helpers shared by dialects.

use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// `java.lang.String#hashCode` over the UTF-16 code units of `text`
pub fn java_hash_code(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Flatten an HTML fragment into a single line of plain text.
pub fn format_text(html: &str) -> String {
    let without_tags = TAG.replace_all(html, " ");
    let cleaned = without_tags
        .replace("&nbsp", "")
        .replace('\r', "")
        .replace('\n', " ");
    SPACES.replace_all(&cleaned, " ").trim().to_string()
}

/// Test name qualified by its class unless the name already carries it.
pub fn qualified_name(class_name: Option<&str>, name: Option<&str>) -> Option<String> {
    let name = name?;
    Some(match class_name {
        Some(class) if !name.starts_with(class) => format!("{class}.{name}"),
        _ => name.to_string(),
    })
}

/// Report a file path relative to `base`, with forward slashes.
pub fn relative_path(base: Option<&str>, path: Option<&str>) -> String {
    let path = match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => path.replace('\\', "/"),
        None => return "<unknown>".to_string(),
    };

    let stripped = base
        .map(|b| b.replace('\\', "/"))
        .map(|b| b.trim_end_matches('/').to_string())
        .filter(|b| !b.is_empty())
        .and_then(|b| {
            path.strip_prefix(&b)
                .filter(|rest| rest.starts_with('/'))
                .map(|rest| rest.trim_start_matches('/').to_string())
        })
        .unwrap_or(path);

    match stripped.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => stripped,
    }
}

/// Upper-case the first character.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn is_blank(text: Option<&str>) -> bool {
    text.is_none_or(|t| t.trim().is_empty())
}
