//! Rendering of `.gotmpl` resources.
//!
//! Only plain `{{ .name }}` placeholders are supported. Lookups go
//! through each variable table in order; the first hit wins.

use crate::error::{Error, Result};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{-?\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*-?\}\}").expect("placeholder pattern is valid")
});

/// Render `content`, resolving each placeholder against `tables` in order.
pub fn render(path: &str, content: &str, tables: &[&BTreeMap<String, String>]) -> Result<String> {
    let mut missing: Option<String> = None;

    let rendered = PLACEHOLDER.replace_all(content, |caps: &Captures<'_>| {
        let name = &caps[1];
        match tables.iter().find_map(|t| t.get(name)) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    if let Some(variable) = missing {
        return Err(Error::MissingVariable {
            path: path.to_string(),
            variable,
        });
    }

    Ok(rendered.into_owned())
}
