//! Cross-document consistency between a backend template and its frontend.

use crate::domain::model::{
    Binding, Contract, Diagnostic, DiagnosticKind, HttpMethod, MissingRoutePolicy, PairRecord,
    Role, Severity, Verdict,
};
use std::collections::HashSet;

/// Checks the extracted contracts of `record` under `binding`.
pub fn check(record: &PairRecord, binding: &Binding, policy: MissingRoutePolicy) -> Verdict {
    let verdict = Verdict::from_diagnostics(collect_diagnostics(record, binding, policy));
    tracing::debug!(
        "{}: {} ({} error(s), {} warning(s))",
        record.app_id,
        verdict.status(),
        verdict.count(Severity::Error),
        verdict.count(Severity::Warning)
    );
    verdict
}

/// Every finding for the pair, informational ones included.
///
/// Extraction diagnostics of both sides are carried over. Route and port
/// checks only run when both halves of the pair are present.
pub fn collect_diagnostics(
    record: &PairRecord,
    binding: &Binding,
    policy: MissingRoutePolicy,
) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = record
        .backend_contract
        .iter()
        .chain(record.frontend_contract.iter())
        .flat_map(|c| c.diagnostics.iter().cloned())
        .collect();

    if let (Some(backend), Some(frontend)) = (&record.backend_contract, &record.frontend_contract) {
        diagnostics.extend(check_routes(backend, frontend, policy));
        diagnostics.extend(check_ports(backend, frontend, binding));
        diagnostics.extend(check_form_fields(backend, frontend));
    }
    diagnostics
}

pub fn check_routes(
    backend: &Contract,
    frontend: &Contract,
    policy: MissingRoutePolicy,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let declared: HashSet<(HttpMethod, &str)> = backend.routes.iter().map(|r| r.key()).collect();
    let expected: HashSet<(HttpMethod, &str)> = frontend.routes.iter().map(|r| r.key()).collect();

    let mut reported = HashSet::new();
    for route in &frontend.routes {
        if declared.contains(&route.key()) || !reported.insert(route.key()) {
            continue;
        }
        let caller = route
            .function
            .as_deref()
            .map(|f| format!(" (used by {}())", f))
            .unwrap_or_default();
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::MissingBackendRoute,
                policy.severity(),
                format!("{}{} has no backend route", route, caller),
            )
            .on(Role::Frontend)
            .at_line(route.line),
        );
    }

    for route in &backend.routes {
        if !expected.contains(&route.key()) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::OrphanBackendRoute,
                    Severity::Info,
                    format!("{} is not used by the frontend", route),
                )
                .on(Role::Backend)
                .at_line(route.line),
            );
        }
    }

    diagnostics
}

pub fn check_ports(backend: &Contract, frontend: &Contract, binding: &Binding) -> Vec<Diagnostic> {
    let backend_port = match &backend.listen_port {
        Some(port) => port.resolve(binding),
        None => binding.backend_port(),
    };

    let Some(target) = &frontend.proxy_target else {
        if frontend.routes.is_empty() {
            return Vec::new();
        }
        return vec![Diagnostic::new(
            DiagnosticKind::MissingProxyTarget,
            Severity::Warning,
            "frontend calls backend routes but declares no proxy/target port",
        )
        .on(Role::Frontend)];
    };

    match (backend_port, target.resolve(binding)) {
        (Some(expected), Some(actual)) if expected != actual => vec![Diagnostic::new(
            DiagnosticKind::PortMismatch,
            Severity::Error,
            format!(
                "frontend targets port {} ({}) but backend listens on {}",
                actual, target, expected
            ),
        )
        .on(Role::Frontend)],
        _ => Vec::new(),
    }
}

pub fn check_form_fields(backend: &Contract, frontend: &Contract) -> Vec<Diagnostic> {
    if backend.schema.is_empty() {
        return Vec::new();
    }
    let columns: HashSet<String> = backend
        .schema
        .iter()
        .map(|f| f.column.to_ascii_lowercase())
        .collect();

    frontend
        .form_fields
        .iter()
        .filter(|field| {
            !columns.contains(&field.name.to_ascii_lowercase())
                && !columns.contains(&to_snake_case(&field.name))
        })
        .map(|field| {
            Diagnostic::new(
                DiagnosticKind::UnknownSchemaField,
                Severity::Warning,
                format!("form field '{}' matches no backend column", field.name),
            )
            .on(Role::Frontend)
            .at_line(field.line)
        })
        .collect()
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
