use crate::core::resolver::{ensure_bound, strip_declarations, token_pattern};
use crate::domain::model::{
    Binding, PairRecord, Role, BACKEND_PORT_PLACEHOLDER, FRONTEND_PORT_PLACEHOLDER,
};
use crate::utils::error::{PairgenError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedDocument {
    pub role: Role,
    pub file_name: String,
    #[serde(skip)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedPair {
    pub app_id: String,
    pub documents: Vec<FinalizedDocument>,
}

/// Replaces every placeholder of `body` with its bound value in one pass.
///
/// Everything outside placeholder tokens is copied verbatim, except the
/// `Variables:` declaration lines, which are dropped. A body without
/// placeholders comes back unchanged.
pub fn instantiate(
    app_id: &str,
    body: &str,
    placeholders: &[String],
    binding: &Binding,
) -> Result<String> {
    ensure_bound(app_id, placeholders, binding)?;
    reject_recursive_values(app_id, placeholders, binding)?;

    let Some(pattern) = token_pattern(placeholders.iter().map(String::as_str))? else {
        return Ok(body.to_string());
    };

    let body = strip_declarations(body);
    let output = pattern.replace_all(&body, |caps: &regex::Captures| {
        binding.get(&caps[0]).unwrap_or(&caps[0]).to_string()
    });
    Ok(output.into_owned())
}

/// A used value must not contain any token that could itself be substituted.
fn reject_recursive_values(app_id: &str, placeholders: &[String], binding: &Binding) -> Result<()> {
    let tokens = placeholders
        .iter()
        .map(String::as_str)
        .chain(binding.iter().map(|(name, _)| name))
        .chain([BACKEND_PORT_PLACEHOLDER, FRONTEND_PORT_PLACEHOLDER]);
    let Some(pattern) = token_pattern(tokens)? else {
        return Ok(());
    };

    for name in placeholders {
        let Some(value) = binding.get(name) else { continue };
        if let Some(nested) = pattern.find(value) {
            return Err(PairgenError::RecursiveBinding {
                app_id: app_id.to_string(),
                placeholder: name.clone(),
                value: value.to_string(),
                nested: nested.as_str().to_string(),
            });
        }
    }
    Ok(())
}

pub fn instantiate_pair(record: &PairRecord, binding: &Binding) -> Result<FinalizedPair> {
    let documents = record
        .documents()
        .map(|doc| {
            let body = instantiate(&record.app_id, &doc.body, &doc.placeholders, binding)?;
            Ok(FinalizedDocument {
                role: doc.role,
                file_name: doc.file_name.clone(),
                body,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FinalizedPair {
        app_id: record.app_id.clone(),
        documents,
    })
}
