//! Message template rendering.
//!
//! Placeholders look like `{{name}}`. Field names are matched
//! case-insensitively; `phone` and `number` are always available.

use crate::Contact;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+)\s*\}\}").expect("Invalid placeholder regex")
});

/// Render `template` for `contact`. Unknown placeholders are left untouched.
pub fn render_message(template: &str, contact: &Contact) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = caps[1].to_lowercase();
            match name.as_str() {
                "phone" => contact.identifier.clone(),
                "number" => contact.normalized(),
                _ => contact
                    .field(&name)
                    .map(str::to_string)
                    .unwrap_or_else(|| caps[0].to_string()),
            }
        })
        .into_owned()
}
