//! Placeholder discovery.
//!
//! A template references the two port markers `XXXX` (frontend) and `YYYY`
//! (backend) as whole words, and may declare further variables on a
//! configuration line such as `- Variables: APP_TITLE, DB_NAME`.

use crate::domain::model::{Binding, BACKEND_PORT_PLACEHOLDER, FRONTEND_PORT_PLACEHOLDER};
use crate::utils::error::{PairgenError, Result};
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(XXXX|YYYY)\b").unwrap());

static DECLARATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:[-*+][ \t]+)?(?:\*\*)?(?:variables?|placeholders?)(?:\*\*)?[ \t]*:(.*)$\n?")
        .unwrap()
});

static DECLARED_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^,\s]+").unwrap());

static VARIABLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{2,}$").unwrap());

/// Distinct placeholder tokens of `body`, in first-occurrence order.
pub fn resolve(body: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = MARKER_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| (m.start(), m.as_str().to_string()))
        .collect();

    for caps in DECLARATION_RE.captures_iter(body) {
        let Some(list) = caps.get(1) else { continue };
        found.extend(
            declared_names(list.as_str()).map(|(offset, name)| (list.start() + offset, name.to_string())),
        );
    }

    found.sort_by_key(|(pos, _)| *pos);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter_map(|(_, name)| seen.insert(name.clone()).then_some(name))
        .collect()
}

/// Valid variable names of one declaration list, with their byte offsets.
fn declared_names(list: &str) -> impl Iterator<Item = (usize, &str)> {
    DECLARED_TOKEN_RE.find_iter(list).filter_map(|m| {
        let token = m.as_str();
        let name = token.trim_start_matches(['`', '*']);
        let lead = token.len() - name.len();
        let name = name.trim_end_matches(['`', '*']);
        VARIABLE_NAME_RE
            .is_match(name)
            .then_some((m.start() + lead, name))
    })
}

/// Removes the `Variables:` lines that declare at least one name.
///
/// They describe the template, not the finished document, and keeping them
/// would turn bound values into new declarations.
pub fn strip_declarations(body: &str) -> Cow<'_, str> {
    DECLARATION_RE.replace_all(body, |caps: &regex::Captures| {
        let declares = caps
            .get(1)
            .is_some_and(|list| declared_names(list.as_str()).next().is_some());
        if declares {
            String::new()
        } else {
            caps[0].to_string()
        }
    })
}

pub fn is_port_placeholder(name: &str) -> bool {
    name == BACKEND_PORT_PLACEHOLDER || name == FRONTEND_PORT_PLACEHOLDER
}

/// Fails on the first placeholder with no value in `binding`.
pub fn ensure_bound(app_id: &str, placeholders: &[String], binding: &Binding) -> Result<()> {
    match placeholders.iter().find(|name| !binding.contains(name)) {
        Some(name) => Err(PairgenError::UnboundPlaceholder {
            app_id: app_id.to_string(),
            placeholder: name.clone(),
        }),
        None => Ok(()),
    }
}

/// Whole-word matcher for any of `names`. Longest names are tried first.
pub fn token_pattern<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Option<Regex>> {
    let mut names: Vec<&str> = names.into_iter().collect();
    if names.is_empty() {
        return Ok(None);
    }
    names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    names.dedup();

    let alternation = names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&format!(r"\b(?:{})\b", alternation))
        .map(Some)
        .map_err(|e| PairgenError::ConfigValidationError {
            field: "bindings".to_string(),
            message: format!("Cannot build placeholder matcher: {}", e),
        })
}
