//! Internationalization (i18n) module.
//!
//! Catalogs are embedded with `include_str!` and looked up by dotted keys.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;
use tracing::warn;

/// Global translation store: LangCode -> catalog
static TRANSLATIONS: OnceLock<HashMap<String, Value>> = OnceLock::new();

const CATALOGS: [(&str, &str); 2] = [
    ("en", include_str!("en.json")),
    ("ru", include_str!("ru.json")),
];

/// Load the embedded catalogs. Safe to call more than once.
pub fn init() {
    store();
}

fn store() -> &'static HashMap<String, Value> {
    TRANSLATIONS.get_or_init(|| {
        let mut map = HashMap::new();
        for (lang, raw) in CATALOGS {
            match serde_json::from_str(raw) {
                Ok(val) => {
                    map.insert(lang.to_string(), val);
                }
                Err(e) => warn!("Broken {} catalog: {}", lang, e),
            }
        }
        map
    })
}

/// Get text for a key in a specific language.
/// Supports nested keys via dot notation, e.g., "captcha.prompt".
///
/// Falls back to English, then to the key itself.
pub fn get_text(lang: &str, key: &str) -> String {
    let store = store();

    if let Some(text) = store.get(lang).and_then(|val| resolve_key(val, key)) {
        return text;
    }

    if lang != "en" {
        if let Some(text) = store.get("en").and_then(|val| resolve_key(val, key)) {
            return text;
        }
    }

    key.to_string()
}

/// [`get_text`] with `{name}` placeholders filled in.
pub fn format_text(lang: &str, key: &str, args: &[(&str, &str)]) -> String {
    fill(&get_text(lang, key), args)
}

/// Fill placeholders in one pass; inserted values are never scanned again.
///
/// Unknown placeholders and stray braces are kept as they are.
fn fill(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let value = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            args.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_key(val: &Value, key: &str) -> Option<String> {
    let mut current = val;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    current.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_keys() {
        assert_eq!(get_text("en", "captcha.items.cat"), "cat");
        assert_eq!(get_text("ru", "captcha.items.cat"), "кошку");
    }

    #[test]
    fn falls_back_to_english_then_to_the_key() {
        assert_eq!(get_text("de", "captcha.items.dog"), "dog");
        assert_eq!(get_text("en", "no.such.key"), "no.such.key");
    }

    #[test]
    fn fills_placeholders() {
        let text = format_text("en", "review.approved", &[("user", "42")]);
        assert_eq!(text, "User 42 approved.");
    }

    #[test]
    fn inserted_values_are_not_expanded_again() {
        let text = format_text(
            "en",
            "review.card",
            &[
                ("tag", "stop_words"),
                ("reason", "stop word"),
                ("chat", "{text}"),
                ("sender", "{chat}"),
                ("text", "hello"),
            ],
        );
        assert_eq!(
            text,
            "[stop_words] stop word\nChat: <b>{text}</b>\nFrom: {chat}\n\nhello"
        );
    }

    #[test]
    fn unknown_placeholders_and_stray_braces_are_kept() {
        assert_eq!(fill("{a} {b} {", &[("a", "1")]), "1 {b} {");
        assert_eq!(fill("x}{a}", &[("a", "{a}")]), "x}{a}");
        assert_eq!(fill("{{a}}", &[("a", "1")]), "{1}");
    }

    #[test]
    fn catalogs_share_their_keys() {
        fn leaves(prefix: &str, val: &Value, out: &mut Vec<String>) {
            match val {
                Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{}.{}", prefix, k)
                        };
                        leaves(&key, v, out);
                    }
                }
                _ => out.push(prefix.to_string()),
            }
        }

        let store = store();
        let mut en = Vec::new();
        let mut ru = Vec::new();
        leaves("", &store["en"], &mut en);
        leaves("", &store["ru"], &mut ru);
        en.sort();
        ru.sort();
        assert_eq!(en, ru);
    }
}
