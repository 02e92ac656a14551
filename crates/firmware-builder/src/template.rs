//! Filename templates.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal braces.
//! Anything else between braces is an error.
//!
//! Format specs and conversions (`{rev:0>2}`, `{rev!r}`) are rejected on
//! purpose. Older catalogs rendered with Python-style formatting may rely on
//! them; such a template fails loudly here instead of rendering a different
//! filename. Store the padded or converted value in the permutation list
//! itself and use a plain `{rev}`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

pub type Params = BTreeMap<String, String>;

fn token_re() -> Result<&'static Regex> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]")
        .map_err(|e| Error::msg(format!("invalid placeholder pattern: {e}")))?;
    Ok(RE.get_or_init(|| re))
}

/// Names referenced by `template`, in order of first appearance.
pub fn placeholders(template: &str) -> Result<Vec<String>> {
    let mut out = Vec::<String>::new();
    for cap in token_re()?.captures_iter(template) {
        let Some(name) = cap.get(1) else {
            check_brace(template, cap.get(0).map(|m| m.as_str()).unwrap_or_default())?;
            continue;
        };
        let name = check_name(template, name.as_str())?;
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

pub fn render(template: &str, params: &Params) -> Result<String> {
    let re = token_re()?;
    let mut out = String::with_capacity(template.len() + 16);
    let mut last = 0usize;
    for cap in re.captures_iter(template) {
        let Some(whole) = cap.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        let Some(name) = cap.get(1) else {
            out.push_str(check_brace(template, whole.as_str())?);
            continue;
        };
        let name = check_name(template, name.as_str())?;
        let Some(value) = params.get(name) else {
            let known = params.keys().cloned().collect::<Vec<_>>().join(", ");
            return Err(Error::template(format!(
                "'{template}' references unknown parameter '{name}' (known: {known})"
            )));
        };
        out.push_str(value);
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn check_brace<'a>(template: &str, token: &'a str) -> Result<&'a str> {
    match token {
        "{{" => Ok("{"),
        "}}" => Ok("}"),
        "{" => Err(Error::template(format!(
            "'{template}' has an unclosed '{{'"
        ))),
        _ => Err(Error::template(format!(
            "'{template}' has a single '}}' outside a placeholder"
        ))),
    }
}

fn check_name<'a>(template: &str, raw: &'a str) -> Result<&'a str> {
    if raw.is_empty() {
        return Err(Error::template(format!(
            "'{template}' has an empty placeholder '{{}}'"
        )));
    }
    if raw.contains([':', '!']) {
        return Err(Error::template(format!(
            "'{template}' placeholder '{{{raw}}}' uses a format spec, which is not supported"
        )));
    }
    Ok(raw)
}
