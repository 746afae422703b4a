//! Laravel route files.
//!
//! Visits every call in a route file and keeps the ones addressed to the
//! `Route` facade (or a `$router`/`$route` instance). `resource` and
//! `apiResource` expand to their conventional action tables; `group` is not
//! expanded, but the routes inside its closure are still visited.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tree_sitter::Node;

use super::literal::{Expr, fold_string, fold_string_list};
use super::{call_site, innermost_call};
use crate::chunk::{Chunk, ChunkKind};
use crate::error::{IndexError, Result};
use crate::indexer::code_parser::{CodeParser, end_line, node_text};
use crate::indexer::languages::Language;
use crate::indexer::symbols::Receiver;

const VERB_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "options", "any"];

const FACADES: &[&str] = &["Route", "Illuminate\\Support\\Facades\\Route"];

const ROUTER_VARS: &[&str] = &["router", "route"];

/// Controller recorded for closure actions.
pub const CLOSURE_CONTROLLER: &str = "Closure";

/// action, verb, URI suffix
const RESOURCE_ACTIONS: &[(&str, &str, &str)] = &[
    ("index", "GET", ""),
    ("create", "GET", "/create"),
    ("store", "POST", ""),
    ("show", "GET", "/{id}"),
    ("edit", "GET", "/{id}/edit"),
    ("update", "PUT/PATCH", "/{id}"),
    ("destroy", "DELETE", "/{id}"),
];

const API_RESOURCE_ACTIONS: &[&str] = &["index", "store", "show", "update", "destroy"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDescriptor {
    pub method: String,
    pub uri: String,
    pub controller: String,
    pub action: String,
    pub file_path: String,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
    #[serde(skip)]
    pub end_line: usize,
    #[serde(skip)]
    pub code: String,
}

impl RouteDescriptor {
    pub fn to_chunk(&self) -> Chunk {
        let handler = match (self.controller.as_str(), self.action.as_str()) {
            ("", _) => String::new(),
            (controller, "") => format!(" {controller}"),
            (controller, action) => format!(" {controller}@{action}"),
        };
        let mut chunk = Chunk::new(
            ChunkKind::Route,
            format!("{} {}", self.method, self.uri),
            Language::Php.as_str(),
            self.file_path.clone(),
            self.line,
            self.end_line,
        )
        .with_signature(format!("{} {}{handler}", self.method, self.uri))
        .with_code(self.code.clone());
        chunk.set_meta("method", self.method.clone());
        chunk.set_meta("uri", self.uri.clone());
        chunk.set_meta("controller", self.controller.clone());
        chunk.set_meta("action", self.action.clone());
        if let Some(name) = &self.name {
            chunk.set_meta("route_name", name.clone());
        }
        chunk.set_meta("middleware", self.middleware.clone());
        chunk
    }
}

pub struct RouteParser {
    parser: CodeParser,
}

impl RouteParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: CodeParser::new(Language::Php)?,
        })
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<Vec<RouteDescriptor>> {
        let source = fs::read(path).map_err(|e| IndexError::io(path, e))?;
        self.parse_source(path, &source)
    }

    /// Routes of one file, in call-site order.
    pub fn parse_source(&mut self, path: &Path, source: &[u8]) -> Result<Vec<RouteDescriptor>> {
        let tree = self.parser.parse_strict(source, path)?;
        let mut visitor = RouteVisitor {
            source,
            file_path: path.to_string_lossy().replace('\\', "/"),
            routes: Vec::new(),
        };
        visitor.visit(tree.root_node());
        Ok(visitor.routes)
    }
}

struct RouteVisitor<'a> {
    source: &'a [u8],
    file_path: String,
    routes: Vec<RouteDescriptor>,
}

impl RouteVisitor<'_> {
    fn visit(&mut self, node: Node) {
        if let Some(mut prefix_middleware) = self.route_receiver(node) {
            self.route_call(node, &mut prefix_middleware);
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
    }

    /// `Some(middleware)` when `node` is a call on the route registrar.
    /// The middleware comes from a fluent prefix such as
    /// `Route::middleware('auth')->get(...)`.
    fn route_receiver(&self, node: Node) -> Option<Vec<String>> {
        match node.kind() {
            "scoped_call_expression" => {
                let scope = node.child_by_field_name("scope")?;
                is_facade(node_text(scope, self.source)).then(Vec::new)
            }
            "member_call_expression" => {
                let object = node.child_by_field_name("object")?;
                if object.kind() == "variable_name" {
                    let var = node_text(object, self.source).trim_start_matches('$');
                    return ROUTER_VARS.contains(&var).then(Vec::new);
                }
                let root = innermost_call(object);
                let root_call = call_site(root, self.source)?;
                match root_call.receiver {
                    Receiver::Static(scope) if is_facade(&scope) => {
                        Some(chain_middleware(object, self.source))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn route_call(&mut self, node: Node, prefix_middleware: &mut Vec<String>) {
        let Some(call) = call_site(node, self.source) else {
            return;
        };
        let method = call.name.as_str();
        let args = &call.args;
        let mut base = RouteDescriptor {
            method: String::new(),
            uri: String::new(),
            controller: String::new(),
            action: String::new(),
            file_path: self.file_path.clone(),
            line: call.line,
            name: None,
            middleware: std::mem::take(prefix_middleware),
            end_line: call.line,
            code: String::new(),
        };
        let outer = self.trailing_chain(node, &mut base);
        base.end_line = end_line(outer);
        base.code = node_text(outer, self.source).to_string();

        if VERB_METHODS.contains(&method) {
            let (controller, action) = parse_action(args.get(1));
            self.routes.push(RouteDescriptor {
                method: method.to_ascii_uppercase(),
                uri: literal_uri(args.first()),
                controller,
                action,
                ..base
            });
        } else if method == "match" {
            let verbs = args.first().map(fold_string_list).unwrap_or_default();
            let uri = literal_uri(args.get(1));
            let (controller, action) = parse_action(args.get(2));
            for verb in verbs {
                self.routes.push(RouteDescriptor {
                    method: verb.to_ascii_uppercase(),
                    uri: uri.clone(),
                    controller: controller.clone(),
                    action: action.clone(),
                    ..base.clone()
                });
            }
        } else if method == "resource" || method == "apiResource" {
            let name = literal_uri(args.first());
            let name = name.trim_end_matches('/');
            let controller = args.get(1).and_then(controller_name).unwrap_or_default();
            for (action, verb, suffix) in RESOURCE_ACTIONS {
                if method == "apiResource" && !API_RESOURCE_ACTIONS.contains(action) {
                    continue;
                }
                self.routes.push(RouteDescriptor {
                    method: verb.to_string(),
                    uri: format!("{name}{suffix}"),
                    controller: controller.clone(),
                    action: action.to_string(),
                    ..base.clone()
                });
            }
        }
    }

    /// Follow `->name()`/`->middleware()` calls chained after a route call
    /// and return the outermost call node.
    fn trailing_chain<'t>(&self, node: Node<'t>, route: &mut RouteDescriptor) -> Node<'t> {
        let mut current = node;
        while let Some(parent) = current.parent() {
            let chained = parent.kind() == "member_call_expression"
                && parent
                    .child_by_field_name("object")
                    .is_some_and(|o| o.id() == current.id());
            if !chained {
                break;
            }
            if let Some(call) = call_site(parent, self.source) {
                match call.name.as_str() {
                    "name" => route.name = call.args.first().and_then(fold_string),
                    "middleware" => route.middleware.extend(middleware_args(&call.args)),
                    _ => {}
                }
            }
            current = parent;
        }
        current
    }
}

fn is_facade(scope: &str) -> bool {
    FACADES.contains(&scope.trim_start_matches('\\'))
}

fn chain_middleware(mut node: Node, source: &[u8]) -> Vec<String> {
    let mut middleware = Vec::new();
    loop {
        if let Some(call) = call_site(node, source) {
            if call.name == "middleware" {
                // Inner calls come first in source order.
                let mut found = middleware_args(&call.args);
                found.extend(middleware);
                middleware = found;
            }
        }
        match node
            .child_by_field_name("object")
            .filter(|o| o.kind() == "member_call_expression" || o.kind() == "scoped_call_expression")
        {
            Some(inner) if node.kind() == "member_call_expression" => node = inner,
            _ => return middleware,
        }
    }
}

fn middleware_args(args: &[Expr]) -> Vec<String> {
    args.iter()
        .flat_map(|arg| match arg {
            Expr::List(_) => fold_string_list(arg),
            _ => fold_string(arg).into_iter().collect(),
        })
        .collect()
}

fn literal_uri(arg: Option<&Expr>) -> String {
    arg.and_then(fold_string).unwrap_or_default()
}

fn controller_name(arg: &Expr) -> Option<String> {
    match arg {
        Expr::ClassRef(name) => Some(name.clone()),
        Expr::Str(name) => Some(name.clone()),
        _ => None,
    }
}

/// `[X::class, 'act']`, `'X@act'` or a closure. Anything else is empty.
fn parse_action(arg: Option<&Expr>) -> (String, String) {
    match arg {
        Some(Expr::List(items)) => match items.as_slice() {
            [class, Expr::Str(action)] => match controller_name(class) {
                Some(controller) => (controller, action.clone()),
                None => Default::default(),
            },
            _ => Default::default(),
        },
        Some(Expr::Str(text)) => match text.split_once('@') {
            Some((controller, action)) => (controller.to_string(), action.to_string()),
            None => Default::default(),
        },
        Some(Expr::Closure) => (CLOSURE_CONTROLLER.to_string(), String::new()),
        _ => Default::default(),
    }
}
