use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Frontend dev server port placeholder.
pub const FRONTEND_PORT_PLACEHOLDER: &str = "XXXX";
/// Backend listen port placeholder.
pub const BACKEND_PORT_PLACEHOLDER: &str = "YYYY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Backend,
    Frontend,
}

impl Role {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "backend" => Some(Role::Backend),
            "frontend" => Some(Role::Frontend),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Backend => "backend",
            Role::Frontend => "frontend",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One loaded template file. Never mutated after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDocument {
    pub app_id: String,
    pub app_number: u32,
    pub role: Role,
    pub name: String,
    pub file_name: String,
    pub body: String,
    /// Distinct placeholder tokens in first-occurrence order.
    pub placeholders: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub method: HttpMethod,
    pub path: String,
    /// Path with every parameter collapsed to `{}`.
    pub normalized_path: String,
    pub description: Option<String>,
    /// Client-side function name such as `getNotes`, frontend only.
    pub function: Option<String>,
    pub line: usize,
}

impl RouteSpec {
    pub fn key(&self) -> (HttpMethod, &str) {
        (self.method, self.normalized_path.as_str())
    }
}

impl fmt::Display for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub table: String,
    pub column: String,
    pub type_token: String,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub default: Option<String>,
}

/// How a template refers to a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRef {
    Placeholder(String),
    Literal(u16),
}

impl PortRef {
    /// Concrete port once placeholders are looked up in `binding`.
    pub fn resolve(&self, binding: &Binding) -> Option<u16> {
        match self {
            PortRef::Literal(port) => Some(*port),
            PortRef::Placeholder(name) => binding.port(name),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRef::Placeholder(name) => f.write_str(name),
            PortRef::Literal(port) => write!(f, "{}", port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub line: usize,
}

/// Everything extracted from one template side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub routes: Vec<RouteSpec>,
    pub schema: Vec<SchemaField>,
    pub form_fields: Vec<FormField>,
    pub listen_port: Option<PortRef>,
    pub proxy_target: Option<PortRef>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnparsedLine,
    MissingBackendRoute,
    OrphanBackendRoute,
    PortMismatch,
    MissingProxyTarget,
    UnknownSchemaField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub side: Option<Role>,
    pub message: String,
    pub line: Option<usize>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            side: None,
            message: message.into(),
            line: None,
        }
    }

    pub fn on(mut self, side: Role) -> Self {
        self.side = Some(side);
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "diagnostics", rename_all = "snake_case")]
pub enum Verdict {
    Consistent,
    Warnings(Vec<Diagnostic>),
    Errors(Vec<Diagnostic>),
}

impl Verdict {
    /// Classifies by the worst severity. Info findings alone stay `Consistent`.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let worst = diagnostics.iter().map(|d| d.severity).max();
        match worst {
            Some(Severity::Error) => Verdict::Errors(diagnostics),
            Some(Severity::Warning) => Verdict::Warnings(diagnostics),
            _ => Verdict::Consistent,
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Verdict::Errors(_))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Verdict::Consistent => &[],
            Verdict::Warnings(list) | Verdict::Errors(list) => list,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn status(&self) -> VerdictStatus {
        match self {
            Verdict::Consistent => VerdictStatus::Consistent,
            Verdict::Warnings(_) => VerdictStatus::Warnings,
            Verdict::Errors(_) => VerdictStatus::Errors,
        }
    }
}

/// Verdict without its diagnostics, as shown in reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Consistent,
    Warnings,
    #[default]
    Errors,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Consistent => "consistent",
            VerdictStatus::Warnings => "warnings",
            VerdictStatus::Errors => "errors",
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Placeholder name to concrete value, scoped to one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Binding {
    values: BTreeMap<String, String>,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn port(&self, name: &str) -> Option<u16> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn backend_port(&self) -> Option<u16> {
        self.port(BACKEND_PORT_PLACEHOLDER)
    }

    pub fn frontend_port(&self) -> Option<u16> {
        self.port(FRONTEND_PORT_PLACEHOLDER)
    }
}

/// Severity given to a frontend route the backend does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingRoutePolicy {
    #[default]
    Error,
    Warn,
}

impl MissingRoutePolicy {
    pub fn severity(&self) -> Severity {
        match self {
            MissingRoutePolicy::Error => Severity::Error,
            MissingRoutePolicy::Warn => Severity::Warning,
        }
    }
}

impl std::str::FromStr for MissingRoutePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(MissingRoutePolicy::Error),
            "warn" | "warning" => Ok(MissingRoutePolicy::Warn),
            other => Err(format!("unknown missing route policy '{}'", other)),
        }
    }
}

/// Explicit per-application requests from the batch config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOverride {
    pub backend_port: Option<u16>,
    pub frontend_port: Option<u16>,
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
}

/// One application: its backend and/or frontend template plus derived contracts.
#[derive(Debug, Clone)]
pub struct PairRecord {
    pub app_id: String,
    pub app_number: u32,
    pub backend: Option<Arc<TemplateDocument>>,
    pub frontend: Option<Arc<TemplateDocument>>,
    pub backend_contract: Option<Contract>,
    pub frontend_contract: Option<Contract>,
    pub verdict: Option<Verdict>,
}

impl PairRecord {
    pub fn new(app_id: impl Into<String>, app_number: u32) -> Self {
        Self {
            app_id: app_id.into(),
            app_number,
            backend: None,
            frontend: None,
            backend_contract: None,
            frontend_contract: None,
            verdict: None,
        }
    }

    pub fn side(&self, role: Role) -> Option<&Arc<TemplateDocument>> {
        match role {
            Role::Backend => self.backend.as_ref(),
            Role::Frontend => self.frontend.as_ref(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.backend.is_some() && self.frontend.is_some()
    }

    pub fn documents(&self) -> impl Iterator<Item = &Arc<TemplateDocument>> {
        self.backend.iter().chain(self.frontend.iter())
    }
}
