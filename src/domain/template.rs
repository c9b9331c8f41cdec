//! Service configuration template rendering.
//!
//! Minimal placeholder substitution: `{name}` tokens are replaced with the
//! declared value. A token with no declared value is folded to the empty
//! string; callers may log the names returned in [`Rendered::unknown`], but
//! the rendering itself preserves that folding behavior.

/// Output of a render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub contents: String,
    /// Placeholder names that had no declared value and were folded away.
    pub unknown: Vec<String>,
}

fn is_placeholder_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Substitute `{name}` placeholders in `template` using `values`.
///
/// A `{` that does not open a well-formed placeholder is kept literally.
#[must_use]
pub fn render(template: &str, values: &std::collections::BTreeMap<String, String>) -> Rendered {
    let mut contents = String::with_capacity(template.len());
    let mut unknown = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        contents.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if !after[..close].is_empty() && after[..close].chars().all(is_placeholder_char) => {
                let name = &after[..close];
                match values.get(name) {
                    Some(value) => contents.push_str(value),
                    None => unknown.push(name.to_string()),
                }
                rest = &after[close + 1..];
            }
            _ => {
                contents.push('{');
                rest = after;
            }
        }
    }
    contents.push_str(rest);

    Rendered { contents, unknown }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
