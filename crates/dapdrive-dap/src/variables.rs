//! Recursive expansion of variable handles into trees.
//!
//! Adapters hand out `variablesReference` handles for structured values.
//! Handle graphs can contain cycles (a struct pointing back at its parent),
//! so every walk carries a visited set and a depth bound.
use std::collections::HashSet;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;

use crate::driver::SessionDriver;
use crate::error::DapError;
use crate::protocol::Variable;

/// Why a node does or does not have children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// The variable has no children.
    Leaf,
    /// Children were fetched.
    Expanded,
    /// The handle was already expanded earlier in this walk.
    Cycle,
    /// The depth bound was reached before this handle.
    DepthLimit,
    /// Fetching the children failed; siblings are still expanded.
    Failed(String),
}

/// A variable and, when expanded, its children.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub variable: Variable,
    pub expansion: Expansion,
    pub children: Vec<VariableNode>,
}

impl VariableNode {
    fn unexpanded(variable: Variable, expansion: Expansion) -> Self {
        Self {
            variable,
            expansion,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(VariableNode::size).sum::<usize>()
    }

    /// Render the subtree as indented `name = value` lines.
    pub fn render(&self, indent: usize, out: &mut String) {
        let marker = match &self.expansion {
            Expansion::Cycle => " (cycle)".to_string(),
            Expansion::DepthLimit => " (...)".to_string(),
            Expansion::Failed(reason) => format!(" (error: {reason})"),
            Expansion::Leaf | Expansion::Expanded => String::new(),
        };
        let _ = writeln!(
            out,
            "{:width$}{} = {}{}",
            "",
            self.variable.name,
            self.variable.value,
            marker,
            width = indent * 2
        );
        for child in &self.children {
            child.render(indent + 1, out);
        }
    }
}

type ExpandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<VariableNode>, DapError>> + Send + 'a>>;

impl SessionDriver {
    /// Fetch the variables behind `handle` and expand their children.
    ///
    /// At most `max_depth` levels are fetched, the first being `handle`
    /// itself. Each handle is requested at most once per call. A failure
    /// on `handle` itself is returned; a recoverable failure on a nested
    /// handle marks that node [`Expansion::Failed`] instead.
    pub async fn expand_variables(
        &self,
        handle: i64,
        max_depth: usize,
    ) -> Result<Vec<VariableNode>, DapError> {
        if handle == 0 || max_depth == 0 {
            return Ok(Vec::new());
        }
        let mut visited = HashSet::from([handle]);
        self.expand_level(handle, 1, max_depth, &mut visited).await
    }

    fn expand_level<'a>(
        &'a self,
        handle: i64,
        depth: usize,
        max_depth: usize,
        visited: &'a mut HashSet<i64>,
    ) -> ExpandFuture<'a> {
        Box::pin(async move {
            let variables = self.variables(handle).await?;
            let mut nodes = Vec::with_capacity(variables.len());
            for variable in variables {
                let node = match variable.child_reference() {
                    None => VariableNode::unexpanded(variable, Expansion::Leaf),
                    Some(child) if visited.contains(&child) => {
                        tracing::debug!(
                            handle = child,
                            name = %variable.name,
                            "skipping revisited handle"
                        );
                        VariableNode::unexpanded(variable, Expansion::Cycle)
                    }
                    Some(_) if depth >= max_depth => {
                        VariableNode::unexpanded(variable, Expansion::DepthLimit)
                    }
                    Some(child) => {
                        visited.insert(child);
                        match self
                            .expand_level(child, depth + 1, max_depth, visited)
                            .await
                        {
                            Ok(children) => VariableNode {
                                variable,
                                expansion: Expansion::Expanded,
                                children,
                            },
                            Err(e) if e.is_recoverable() => {
                                tracing::warn!(
                                    handle = child,
                                    name = %variable.name,
                                    error = %e,
                                    "could not expand variable"
                                );
                                let reason = e.to_string();
                                VariableNode::unexpanded(variable, Expansion::Failed(reason))
                            }
                            Err(e) => return Err(e),
                        }
                    }
                };
                nodes.push(node);
            }
            Ok(nodes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Timeouts;
    use crate::testing::FakeAdapter;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answer `variables` requests from `graph` until the client hangs up.
    fn serve_graph(
        mut adapter: FakeAdapter,
        graph: HashMap<i64, Value>,
    ) -> (Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            while let Some(req) = adapter.next_request().await {
                assert_eq!(req.command, "variables");
                counter.fetch_add(1, Ordering::SeqCst);
                let reference = req.arguments.as_ref().unwrap()["variablesReference"]
                    .as_i64()
                    .unwrap();
                match graph.get(&reference) {
                    Some(vars) => adapter.respond(&req, json!({ "variables": vars })).await,
                    None => adapter.fail(&req, "unknown reference").await,
                }
            }
        });
        (requests, handle)
    }

    fn var(name: &str, reference: i64) -> Value {
        json!({"name": name, "value": format!("<{name}>"), "variablesReference": reference})
    }

    fn driver_with(graph: HashMap<i64, Value>) -> (SessionDriver, Arc<AtomicUsize>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let driver = SessionDriver::from_stream(client, Timeouts::default()).unwrap();
        let (requests, _handle) = serve_graph(FakeAdapter::new(server), graph);
        (driver, requests)
    }

    #[tokio::test]
    async fn expand_terminates_on_cycle() {
        let graph = HashMap::from([
            (3000, json!([var("p", 3001), var("n", 0)])),
            (3001, json!([var("parent", 3000), var("self", 3001)])),
        ]);
        let (driver, requests) = driver_with(graph);

        let tree = driver.expand_variables(3000, 16).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].expansion, Expansion::Expanded);
        assert_eq!(tree[1].expansion, Expansion::Leaf);
        let children = &tree[0].children;
        assert_eq!(children[0].expansion, Expansion::Cycle);
        assert_eq!(children[1].expansion, Expansion::Cycle);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expand_respects_depth_bound() {
        let graph = HashMap::from([
            (1, json!([var("a", 2)])),
            (2, json!([var("b", 3)])),
            (3, json!([var("c", 4)])),
            (4, json!([var("d", 0)])),
        ]);
        let (driver, requests) = driver_with(graph);

        let tree = driver.expand_variables(1, 2).await.unwrap();
        assert_eq!(tree[0].variable.name, "a");
        assert_eq!(tree[0].expansion, Expansion::Expanded);
        let b = &tree[0].children[0];
        assert_eq!(b.variable.name, "b");
        assert_eq!(b.expansion, Expansion::DepthLimit);
        assert!(b.children.is_empty());
        assert_eq!(requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expand_full_tree_within_bound() {
        let graph = HashMap::from([
            (1, json!([var("a", 2), var("x", 0)])),
            (2, json!([var("b", 0), var("c", 0)])),
        ]);
        let (driver, _) = driver_with(graph);

        let tree = driver.expand_variables(1, 8).await.unwrap();
        assert_eq!(tree.iter().map(VariableNode::size).sum::<usize>(), 4);

        let mut out = String::new();
        for node in &tree {
            node.render(0, &mut out);
        }
        assert_eq!(out, "a = <a>\n  b = <b>\n  c = <c>\nx = <x>\n");
    }

    #[tokio::test]
    async fn expand_zero_handle_is_empty() {
        let (driver, requests) = driver_with(HashMap::new());
        assert!(driver.expand_variables(0, 4).await.unwrap().is_empty());
        assert!(driver.expand_variables(7, 0).await.unwrap().is_empty());
        assert_eq!(requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expand_propagates_root_failure() {
        let (driver, _) = driver_with(HashMap::new());
        let err = driver.expand_variables(1, 4).await.unwrap_err();
        assert!(matches!(err, DapError::RequestFailed { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn expand_keeps_siblings_of_failed_child() {
        let graph = HashMap::from([
            (1, json!([var("a", 99), var("b", 2), var("x", 0)])),
            (2, json!([var("c", 0)])),
        ]);
        let (driver, requests) = driver_with(graph);

        let tree = driver.expand_variables(1, 4).await.unwrap();
        assert_eq!(tree.len(), 3);
        match &tree[0].expansion {
            Expansion::Failed(reason) => assert!(reason.contains("unknown reference")),
            other => panic!("unexpected expansion: {other:?}"),
        }
        assert!(tree[0].children.is_empty());
        assert_eq!(tree[1].expansion, Expansion::Expanded);
        assert_eq!(tree[1].children[0].variable.name, "c");
        assert_eq!(tree[2].expansion, Expansion::Leaf);
        assert_eq!(requests.load(Ordering::SeqCst), 3);

        let mut out = String::new();
        tree[0].render(0, &mut out);
        assert!(out.starts_with("a = <a> (error: "), "got: {out}");
    }
}
