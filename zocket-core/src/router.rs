//! Router and flattening.
//!
//! Routes are declared as a plain nested tree — no proc-macro, no derive —
//! and flattened by a depth-first walk into a `dotted.path -> Procedure`
//! table once, at startup. Dispatch is then a single hash lookup, never a
//! tree walk.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::RouterBuildError;
use crate::handler::Handler;
use crate::middleware::Middleware;
use crate::schema::{NoopValidator, SchemaValidator};

/// The reserved wire token, rejected as a route segment at any depth,
/// not only as a terminal route name.
pub const RESERVED_SEGMENT: &str = "__rpc_res";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A client-originated call this server handles.
    In,
    /// A server-originated event this server only declares, for discovery
    /// and documentation — never dispatched to, never given a handler.
    Out,
}

/// One flattened, dispatch-ready procedure.
pub struct Procedure {
    pub direction: Direction,
    pub handler: Option<Arc<dyn Handler>>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub validator: Arc<dyn SchemaValidator>,
}

/// Builder for a single procedure, attached to a path via
/// [`RouterBuilder::route`] or the [`RouterBuilder::on`] / [`RouterBuilder::out`]
/// shorthands.
pub struct ProcedureBuilder {
    direction: Direction,
    handler: Option<Arc<dyn Handler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    validator: Arc<dyn SchemaValidator>,
}

impl ProcedureBuilder {
    pub fn incoming() -> Self {
        Self { direction: Direction::In, handler: None, middleware: Vec::new(), validator: Arc::new(NoopValidator) }
    }

    pub fn outgoing() -> Self {
        Self { direction: Direction::Out, handler: None, middleware: Vec::new(), validator: Arc::new(NoopValidator) }
    }

    pub fn handler(mut self, handler: impl Handler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.middleware.push(Arc::new(mw));
        self
    }

    pub fn schema(mut self, validator: impl SchemaValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    fn into_procedure(self) -> ProcedureBuilderResult {
        ProcedureBuilderResult {
            direction: self.direction,
            handler: self.handler,
            middleware: self.middleware,
            validator: self.validator,
        }
    }
}

struct ProcedureBuilderResult {
    direction: Direction,
    handler: Option<Arc<dyn Handler>>,
    middleware: Vec<Arc<dyn Middleware>>,
    validator: Arc<dyn SchemaValidator>,
}

enum Node {
    Procedure(ProcedureBuilderResult),
    Group(BTreeMap<String, Node>),
}

/// A nested router tree under construction. Flattened by [`RouterBuilder::build`]
/// into a [`Router`].
pub struct RouterBuilder {
    children: BTreeMap<String, Node>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self { children: BTreeMap::new() }
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `route(path, ProcedureBuilder::incoming().handler(handler))`.
    pub fn on(self, path: &str, handler: impl Handler) -> Self {
        self.route(path, ProcedureBuilder::incoming().handler(handler))
    }

    /// Declare an outgoing (server-to-client) event at `path` without a
    /// handler, so it appears in the flattened table for discovery and so
    /// the reserved-segment check covers it too.
    pub fn out(self, path: &str) -> Self {
        self.route(path, ProcedureBuilder::outgoing())
    }

    /// Attach a fully-configured procedure (middleware, schema, handler) at
    /// `path`. `path` may itself contain dots, e.g. `"rooms.say"`, as
    /// shorthand for nesting one level per segment.
    pub fn route(mut self, path: &str, proc: ProcedureBuilder) -> Self {
        let segments: Vec<&str> = path.split('.').collect();
        insert(&mut self.children, &segments, proc.into_procedure());
        self
    }

    /// Nest a sub-tree under `name`. The closure receives an empty builder
    /// and returns the populated one, the same shape as nesting an HTTP
    /// router under a prefix.
    pub fn group(mut self, name: &str, build: impl FnOnce(RouterBuilder) -> RouterBuilder) -> Self {
        let nested = build(RouterBuilder::new());
        match self.children.entry(name.to_string()) {
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(Node::Group(nested.children));
            }
            std::collections::btree_map::Entry::Occupied(mut e) => {
                if let Node::Group(existing) = e.get_mut() {
                    existing.extend(nested.children);
                } else {
                    // A procedure already claimed this name; the conflict
                    // surfaces as DuplicateRoute during `build`.
                    e.insert(Node::Group(nested.children));
                }
            }
        }
        self
    }

    /// Flatten the tree via depth-first traversal into a dispatch-ready
    /// [`Router`], checking every routing invariant up front so a
    /// malformed route table is a boot-time failure, not a runtime
    /// surprise.
    pub fn build(self) -> Result<Router, RouterBuildError> {
        let mut table = BTreeMap::new();
        flatten(&self.children, String::new(), &mut table)?;
        Ok(Router { table })
    }
}

fn insert(children: &mut BTreeMap<String, Node>, segments: &[&str], proc: ProcedureBuilderResult) {
    let (head, rest) = match segments.split_first() {
        Some(pair) => pair,
        None => return,
    };
    if rest.is_empty() {
        children.insert(head.to_string(), Node::Procedure(proc));
        return;
    }
    let entry = children.entry(head.to_string()).or_insert_with(|| Node::Group(BTreeMap::new()));
    if !matches!(entry, Node::Group(_)) {
        *entry = Node::Group(BTreeMap::new());
    }
    if let Node::Group(sub) = entry {
        insert(sub, rest, proc);
    }
}

fn flatten(
    children: &BTreeMap<String, Node>,
    prefix: String,
    out: &mut BTreeMap<String, Procedure>,
) -> Result<(), RouterBuildError> {
    for (segment, node) in children {
        if segment == RESERVED_SEGMENT {
            return Err(RouterBuildError::ReservedSegment(if prefix.is_empty() {
                segment.clone()
            } else {
                format!("{prefix}.{segment}")
            }));
        }
        let path = if prefix.is_empty() { segment.clone() } else { format!("{prefix}.{segment}") };
        match node {
            Node::Group(sub) => flatten(sub, path, out)?,
            Node::Procedure(proc) => {
                if out.contains_key(&path) {
                    return Err(RouterBuildError::DuplicateRoute(path));
                }
                match proc.direction {
                    Direction::Out if proc.handler.is_some() => {
                        return Err(RouterBuildError::HandlerOnOutgoing(path));
                    }
                    Direction::In if proc.handler.is_none() => {
                        return Err(RouterBuildError::MissingHandler(path));
                    }
                    _ => {}
                }
                out.insert(
                    path,
                    Procedure {
                        direction: proc.direction,
                        handler: proc.handler.clone(),
                        middleware: proc.middleware.clone(),
                        validator: proc.validator.clone(),
                    },
                );
            }
        }
    }
    Ok(())
}

/// The flattened, dispatch-ready router: a single `dotted.path -> Procedure`
/// table built once at startup by [`RouterBuilder::build`].
pub struct Router {
    table: BTreeMap<String, Procedure>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn get(&self, route: &str) -> Option<&Procedure> {
        self.table.get(route)
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}
