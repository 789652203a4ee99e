// Placeholder filling for request payload templates.
//
// Templates reference environment values as `{{ .NAME }}`. The filled text
// is what goes over the wire; the unfilled template is what goes to the
// logs, so secrets injected here never show up in diagnostics.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::warn;

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Replace every `{{ .NAME }}` with `lookup(NAME)`. Unknown names become
/// empty strings.
pub fn fill<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    placeholder()
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            lookup(name).unwrap_or_else(|| {
                warn!(variable = name, "template variable is not set, using empty value");
                String::new()
            })
        })
        .into_owned()
}

/// `fill` against the process environment.
pub fn fill_from_env(template: &str) -> String {
    fill(template, |name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "PROJECT" => Some("alpha".into()),
            "SECRET_TOKEN" => Some("s3cr3t".into()),
            _ => None,
        }
    }

    #[test]
    fn fills_known_placeholders() {
        let filled = fill(
            r#"{"project":"{{ .PROJECT }}","token":"{{.SECRET_TOKEN}}"}"#,
            lookup,
        );
        assert_eq!(filled, r#"{"project":"alpha","token":"s3cr3t"}"#);
    }

    #[test]
    fn unknown_placeholders_become_empty() {
        assert_eq!(fill("a{{ .MISSING }}b", lookup), "ab");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let text = r#"{"braces":"{ not a placeholder }"}"#;
        assert_eq!(fill(text, lookup), text);
    }
}
