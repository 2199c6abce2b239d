//! Route, schema and port extraction from the semi-structured parts of a template.
//!
//! Parsing is line oriented and best effort. A line that looks like it should
//! be a route or a column but does not fit the grammar becomes an
//! `UnparsedLine` diagnostic; extraction itself never fails.

use crate::domain::model::{
    Contract, Diagnostic, DiagnosticKind, FormField, HttpMethod, PortRef, Role, RouteSpec,
    SchemaField, Severity, TemplateDocument, BACKEND_PORT_PLACEHOLDER, FRONTEND_PORT_PLACEHOLDER,
};
use regex::Regex;
use std::sync::LazyLock;

/// Wildcard every path parameter is collapsed to.
pub const PARAM_WILDCARD: &str = "{}";

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap());

static ROUTE_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bapi\s+(?:routes?|endpoints?|integration|functions?)\b").unwrap()
});

static FORM_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:forms?|fields?)\b").unwrap());

static LIST_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(?:[-*+]|\d+[.)])\s+(.*)$").unwrap());

static COMMENT_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?://+|#+|\*+|<!--)\s*(.*)$").unwrap());

static LEADING_VERB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[`*]*(?:GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\b").unwrap());

static ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\b[\s`*:]+(/[^\s`'\x22),]*)").unwrap()
});

static FUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_$][\w$]*)\s*\([^)]*\)").unwrap());

static TABLE_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*(?:table|create\s+table(?:\s+if\s+not\s+exists)?)\s+[`"]?(\w+)[`"]?\s*[{(]\s*(.*)$"#,
    )
    .unwrap()
});

static COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[`"]?([A-Za-z_]\w*)[`"]?\s*(?:\(\s*(.+?)\s*\)|:?\s+(.+?))\s*$"#).unwrap()
});

static TABLE_CONSTRAINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:primary\s+key|foreign\s+key|unique\s*\(|constraint|index|key\s)").unwrap()
});

static DEFAULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bDEFAULT\s+('[^']*'|"[^"]*"|[^\s,]+)"#).unwrap());

static PORT_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:port|listen(?:s|ing)?(?:\s+on)?|runs?\s+on)\b\D{0,24}?\b(YYYY|XXXX|\d{2,5})\b")
        .unwrap()
});

static PROXY_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)proxy|target|backend|api\s*base|api_url|base_?url").unwrap()
});

static HOST_PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:localhost|127\.0\.0\.1|0\.0\.0\.0|backend)\s*:\s*(YYYY|XXXX|\d{1,5})\b").unwrap()
});

static FORM_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[`*]*([A-Za-z_]\w*)[`*]*\s*(?:\(|:|-|$)").unwrap());

pub fn extract(doc: &TemplateDocument) -> Contract {
    extract_contract(&doc.body, doc.role)
}

pub fn extract_contract(body: &str, role: Role) -> Contract {
    let mut scanner = Scanner::new(role);
    for (idx, line) in body.lines().enumerate() {
        scanner.feed(idx + 1, line);
    }
    scanner.finish()
}

/// `/api/posts/<id>`, `/api/posts/:id` and `/api/posts/{id}/` all become `/api/posts/{}`.
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| if is_parameter(segment) { PARAM_WILDCARD } else { segment })
        .collect();
    format!("/{}", segments.join("/"))
}

fn is_parameter(segment: &str) -> bool {
    segment.starts_with(':')
        || segment.starts_with("${")
        || (segment.starts_with('<') && segment.ends_with('>'))
        || (segment.starts_with('{') && segment.ends_with('}'))
        || (segment.starts_with('[') && segment.ends_with(']'))
}

/// Parses one route candidate. The verb/path pair may sit anywhere in the line.
pub fn parse_route_line(text: &str, line: usize) -> Option<RouteSpec> {
    let caps = ROUTE_RE.captures(text)?;
    let verb = caps.get(1)?;
    let method = HttpMethod::parse(verb.as_str())?;
    let path = caps
        .get(2)?
        .as_str()
        .trim_end_matches(['.', ':', ';', ','])
        .to_string();

    let function = FUNCTION_RE
        .captures(&text[..verb.start()])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let tail = &text[caps.get(0)?.end()..];
    let description = tail
        .trim_matches(|c: char| c.is_whitespace() || "-–—:`*()".contains(c))
        .to_string();

    Some(RouteSpec {
        method,
        normalized_path: normalize_path(&path),
        path,
        description: (!description.is_empty()).then_some(description),
        function,
        line,
    })
}

/// Parses `column (TYPE constraints)` or `column TYPE constraints`.
pub fn parse_column(table: &str, text: &str) -> Option<SchemaField> {
    let text = text.trim().trim_end_matches(',').trim();
    let caps = COLUMN_RE.captures(text)?;
    let column = caps.get(1)?.as_str().to_string();
    let spec = caps.get(2).or_else(|| caps.get(3))?.as_str().trim();

    let type_token = spec.split_whitespace().next()?.to_ascii_uppercase();
    let upper = spec.to_ascii_uppercase();
    let primary_key = upper.contains("PRIMARY KEY");
    let not_null = upper.contains("NOT NULL");
    let default = DEFAULT_RE
        .captures(spec)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Some(SchemaField {
        table: table.to_string(),
        column,
        type_token,
        nullable: !(not_null || primary_key),
        unique: upper.split_whitespace().any(|w| w == "UNIQUE"),
        primary_key,
        default,
    })
}

/// Splits on `sep` outside parentheses.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

struct Scanner {
    role: Role,
    contract: Contract,
    in_fence: bool,
    route_section: Option<usize>,
    form_section: Option<usize>,
    table: Option<String>,
    own_url_target: Option<PortRef>,
}

impl Scanner {
    fn new(role: Role) -> Self {
        Self {
            role,
            contract: Contract::default(),
            in_fence: false,
            route_section: None,
            form_section: None,
            table: None,
            own_url_target: None,
        }
    }

    fn feed(&mut self, line_no: usize, line: &str) {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            self.in_fence = !self.in_fence;
            self.table = None;
            return;
        }

        if !self.in_fence {
            if let Some(caps) = HEADING_RE.captures(trimmed) {
                let level = caps[1].len();
                self.enter_heading(level, &caps[2]);
                return;
            }
        }

        self.scan_ports(trimmed);

        if self.in_fence && self.role == Role::Backend && self.scan_schema(line_no, trimmed) {
            return;
        }
        if self.route_section.is_some() {
            self.scan_route(line_no, line);
        }
        if self.form_section.is_some() && !self.in_fence {
            self.scan_form_field(line_no, line);
        }
    }

    fn enter_heading(&mut self, level: usize, title: &str) {
        if self.route_section.is_some_and(|l| level <= l) {
            self.route_section = None;
        }
        if self.form_section.is_some_and(|l| level <= l) {
            self.form_section = None;
        }
        if ROUTE_HEADING_RE.is_match(title) {
            self.route_section = Some(level);
        } else if FORM_HEADING_RE.is_match(title) {
            self.form_section = Some(level);
        }
    }

    fn scan_route(&mut self, line_no: usize, line: &str) {
        let (candidate, nested) = if let Some(caps) = LIST_MARKER_RE.captures(line) {
            (caps.get(2).map(|m| m.as_str()), caps[1].len() >= 2)
        } else if self.in_fence {
            match COMMENT_MARKER_RE.captures(line) {
                Some(caps) => (caps.get(1).map(|m| m.as_str()), false),
                // 程式碼本體只在剛好是路由時採用
                None => (Some(line.trim()).filter(|t| ROUTE_RE.is_match(t)), false),
            }
        } else if LEADING_VERB_RE.is_match(line.trim()) {
            (Some(line.trim()), false)
        } else {
            (None, false)
        };

        let Some(text) = candidate else { return };
        if text.trim().is_empty() {
            return;
        }

        match parse_route_line(text, line_no) {
            Some(route) => {
                tracing::trace!("line {}: {} {}", line_no, route.method, route.path);
                self.contract.routes.push(route);
            }
            // 縮排的子項目通常是上一條路由的說明
            None if nested || self.in_fence => {}
            None => self.unparsed(line_no, format!("not a route: '{}'", text.trim())),
        }
    }

    /// Returns true when the line belonged to a schema block.
    fn scan_schema(&mut self, line_no: usize, trimmed: &str) -> bool {
        if let Some(caps) = TABLE_OPEN_RE.captures(trimmed) {
            let table = caps[1].to_string();
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            let closing = rest
                .strip_suffix(';')
                .unwrap_or(rest)
                .trim_end()
                .strip_suffix(['}', ')']);
            match closing {
                Some(columns) => {
                    for column in split_top_level(columns, ',') {
                        self.push_column(line_no, &table, column);
                    }
                }
                None => {
                    if !rest.is_empty() {
                        self.push_column(line_no, &table, rest);
                    }
                    self.table = Some(table);
                }
            }
            return true;
        }

        let Some(table) = self.table.clone() else {
            return false;
        };
        if matches!(trimmed, "}" | ")" | ");" | "};") {
            self.table = None;
        } else if !trimmed.is_empty() && !trimmed.starts_with("--") && !trimmed.starts_with("//") {
            self.push_column(line_no, &table, trimmed);
        }
        true
    }

    fn push_column(&mut self, line_no: usize, table: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() || TABLE_CONSTRAINT_RE.is_match(text) {
            return;
        }
        match parse_column(table, text) {
            Some(field) => self.contract.schema.push(field),
            None => self.unparsed(line_no, format!("not a column of '{}': '{}'", table, text)),
        }
    }

    fn scan_ports(&mut self, trimmed: &str) {
        // 前端提到後端/代理的行先當作代理目標解析
        if self.role == Role::Frontend && PROXY_LINE_RE.is_match(trimmed) && self.scan_proxy(trimmed) {
            return;
        }

        if self.contract.listen_port.is_none() {
            let role = self.role;
            let own = PORT_KEYWORD_RE
                .captures_iter(trimmed)
                .filter_map(|c| port_ref(&c[1]))
                .find(|port| is_own_port(role, port));
            if own.is_some() {
                self.contract.listen_port = own;
            }
        }
    }

    /// True when the line was taken as backend target information.
    fn scan_proxy(&mut self, trimmed: &str) -> bool {
        if self.contract.proxy_target.is_some() {
            return true;
        }

        let urls: Vec<PortRef> = HOST_PORT_RE
            .captures_iter(trimmed)
            .filter_map(|c| port_ref(&c[1]))
            .collect();
        if let Some(target) = urls.iter().find(|port| !is_frontend_marker(port)) {
            self.contract.proxy_target = Some(target.clone());
            return true;
        }
        if let Some(own) = urls.into_iter().next() {
            // 指向前端自己的網址，之後沒有其他目標時才採用
            self.own_url_target.get_or_insert(own);
            return true;
        }

        match PORT_KEYWORD_RE
            .captures_iter(trimmed)
            .filter_map(|c| port_ref(&c[1]))
            .find(|port| !is_frontend_marker(port))
        {
            Some(target) => {
                self.contract.proxy_target = Some(target);
                true
            }
            None => false,
        }
    }

    fn finish(mut self) -> Contract {
        if self.contract.proxy_target.is_none() {
            self.contract.proxy_target = self.own_url_target.take();
        }
        self.contract
    }

    fn scan_form_field(&mut self, line_no: usize, line: &str) {
        let Some(caps) = LIST_MARKER_RE.captures(line) else { return };
        let Some(text) = caps.get(2) else { return };
        if let Some(name) = FORM_FIELD_RE.captures(text.as_str()).and_then(|c| c.get(1)) {
            self.contract.form_fields.push(FormField {
                name: name.as_str().to_string(),
                line: line_no,
            });
        }
    }

    fn unparsed(&mut self, line_no: usize, message: String) {
        self.contract.diagnostics.push(
            Diagnostic::new(DiagnosticKind::UnparsedLine, Severity::Warning, message)
                .on(self.role)
                .at_line(line_no),
        );
    }
}

fn is_frontend_marker(port: &PortRef) -> bool {
    matches!(port, PortRef::Placeholder(name) if name == FRONTEND_PORT_PLACEHOLDER)
}

/// A backend never listens on `XXXX`, a frontend never on `YYYY`.
fn is_own_port(role: Role, port: &PortRef) -> bool {
    match (role, port) {
        (Role::Backend, PortRef::Placeholder(name)) => name != FRONTEND_PORT_PLACEHOLDER,
        (Role::Frontend, PortRef::Placeholder(name)) => name != BACKEND_PORT_PLACEHOLDER,
        (_, PortRef::Literal(_)) => true,
    }
}

fn port_ref(token: &str) -> Option<PortRef> {
    match token {
        "XXXX" | "YYYY" => Some(PortRef::Placeholder(token.to_string())),
        digits => digits.parse().ok().filter(|p| *p > 0).map(PortRef::Literal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND: &str = r#"# Notes API (Flask)

Runs on port YYYY.

## API Routes
1. GET /api/notes - List all notes
2. POST /api/notes - Create a note
3. PUT /api/notes/<int:note_id> - Update a note
4. **DELETE** `/api/notes/<id>`: Delete a note
5. Health check endpoint
   - returns 200 when the database is reachable

## Database Schema
```
table notes {
  id (INTEGER PRIMARY KEY)
  title (TEXT NOT NULL)
  slug (VARCHAR(120) UNIQUE NOT NULL)
  created_at (TIMESTAMP DEFAULT CURRENT_TIMESTAMP)
  ???
}
table tags { id (INTEGER PRIMARY KEY), name (TEXT UNIQUE) }
```
"#;

    const FRONTEND: &str = r#"# Notes UI (React)

## Configuration
- Dev server port: XXXX
- Vite proxy target: http://localhost:YYYY

## API Integration
```js
// getNotes() -> GET /api/notes
// createNote(data) -> POST /api/notes
```

## Note Form
- title (required)
- body: textarea
- Submit button
"#;

    #[test]
    fn test_backend_routes() {
        let contract = extract_contract(BACKEND, Role::Backend);
        let routes: Vec<String> = contract.routes.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            routes,
            vec![
                "GET /api/notes",
                "POST /api/notes",
                "PUT /api/notes/<int:note_id>",
                "DELETE /api/notes/<id>",
            ]
        );
        assert_eq!(contract.routes[0].description.as_deref(), Some("List all notes"));
        assert_eq!(contract.routes[3].normalized_path, "/api/notes/{}");
        assert_eq!(contract.routes[2].line, 8);
    }

    #[test]
    fn test_backend_unparsed_lines_are_diagnostics() {
        let contract = extract_contract(BACKEND, Role::Backend);
        let unparsed: Vec<&Diagnostic> = contract
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UnparsedLine)
            .collect();
        // "Health check endpoint" and the "???" column; the nested bullet is ignored
        assert_eq!(unparsed.len(), 2);
        assert!(unparsed.iter().all(|d| d.severity == Severity::Warning));
        assert_eq!(unparsed[0].line, Some(10));
    }

    #[test]
    fn test_backend_schema() {
        let contract = extract_contract(BACKEND, Role::Backend);
        let columns: Vec<(&str, &str)> = contract
            .schema
            .iter()
            .map(|f| (f.table.as_str(), f.column.as_str()))
            .collect();
        assert_eq!(
            columns,
            vec![
                ("notes", "id"),
                ("notes", "title"),
                ("notes", "slug"),
                ("notes", "created_at"),
                ("tags", "id"),
                ("tags", "name"),
            ]
        );

        let id = &contract.schema[0];
        assert!(id.primary_key);
        assert!(!id.nullable);

        let slug = &contract.schema[2];
        assert_eq!(slug.type_token, "VARCHAR(120)");
        assert!(slug.unique);
        assert!(!slug.nullable);

        let created = &contract.schema[3];
        assert!(created.nullable);
        assert_eq!(created.default.as_deref(), Some("CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_backend_listen_port() {
        let contract = extract_contract(BACKEND, Role::Backend);
        assert_eq!(contract.listen_port, Some(PortRef::Placeholder("YYYY".into())));
        assert_eq!(contract.proxy_target, None);
    }

    #[test]
    fn test_frontend_contract() {
        let contract = extract_contract(FRONTEND, Role::Frontend);
        assert_eq!(contract.routes.len(), 2);
        assert_eq!(contract.routes[0].function.as_deref(), Some("getNotes"));
        assert_eq!(contract.routes[1].function.as_deref(), Some("createNote"));
        assert_eq!(contract.routes[1].method, HttpMethod::Post);
        assert_eq!(contract.listen_port, Some(PortRef::Placeholder("XXXX".into())));
        assert_eq!(contract.proxy_target, Some(PortRef::Placeholder("YYYY".into())));
        assert!(contract.schema.is_empty());

        let fields: Vec<&str> = contract.form_fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["title", "body"]);
    }

    #[test]
    fn test_synthetic_template_yields_exact_route_count() {
        let methods = ["GET", "POST", "PUT", "PATCH", "DELETE"];
        let mut body = String::from("## Required API Endpoints\n");
        for i in 0..25 {
            body.push_str(&format!("- {} /api/items{}/:id\n", methods[i % methods.len()], i));
        }
        let contract = extract_contract(&body, Role::Backend);
        assert_eq!(contract.routes.len(), 25);
        for (i, route) in contract.routes.iter().enumerate() {
            assert_eq!(route.method.as_str(), methods[i % methods.len()]);
            assert_eq!(route.path, format!("/api/items{}/:id", i));
            assert_eq!(route.normalized_path, format!("/api/items{}/{{}}", i));
        }
        assert!(contract.diagnostics.is_empty());
    }

    #[test]
    fn test_route_section_ends_at_sibling_heading() {
        let body = "## API Routes\n- GET /api/a\n### Details\n- GET /api/b\n## Deployment\n- GET /not/a/route\n";
        let contract = extract_contract(body, Role::Backend);
        let paths: Vec<&str> = contract.routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/api/a", "/api/b"]);
    }

    #[test]
    fn test_normalize_path_forms_compare_equal() {
        let forms = [
            "/api/posts/<id>",
            "/api/posts/:id",
            "/api/posts/{postId}",
            "/api/posts/<int:id>/",
            "/api/posts/[id]",
            "/api/posts/${id}",
            "//api/posts/:id?expand=1",
        ];
        for form in forms {
            assert_eq!(normalize_path(form), "/api/posts/{}", "form {form}");
        }
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_literal_proxy_port() {
        let body = "## Setup\n- Proxy `/api` to backend at http://127.0.0.1:5001\n";
        let contract = extract_contract(body, Role::Frontend);
        assert_eq!(contract.proxy_target, Some(PortRef::Literal(5001)));
    }

    #[test]
    fn test_backend_ignores_frontend_port_mentioned_first() {
        let body = "## Configuration\n- Frontend port: XXXX (for CORS)\n- Backend port: YYYY\n";
        let contract = extract_contract(body, Role::Backend);
        assert_eq!(contract.listen_port, Some(PortRef::Placeholder("YYYY".into())));
    }

    #[test]
    fn test_proxy_target_found_on_later_line() {
        let body = "## Setup\n- Vite dev server on port XXXX with a proxy to the backend\n- target: 'http://localhost:YYYY'\n";
        let contract = extract_contract(body, Role::Frontend);
        assert_eq!(contract.listen_port, Some(PortRef::Placeholder("XXXX".into())));
        assert_eq!(contract.proxy_target, Some(PortRef::Placeholder("YYYY".into())));
    }

    #[test]
    fn test_proxy_to_own_port_kept_when_nothing_else() {
        let body = "- Dev server port: XXXX\n- Proxy /api to http://localhost:XXXX\n";
        let contract = extract_contract(body, Role::Frontend);
        assert_eq!(contract.proxy_target, Some(PortRef::Placeholder("XXXX".into())));

        let body = "- Open http://localhost:XXXX, the backend is at http://localhost:YYYY\n";
        let contract = extract_contract(body, Role::Frontend);
        assert_eq!(contract.proxy_target, Some(PortRef::Placeholder("YYYY".into())));
    }
}
