//! Client-side breakpoint bookkeeping.
//!
//! DAP's `setBreakpoints` replaces every breakpoint of a source at once, so
//! breakpoints are grouped per file and sent as a whole list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::protocol::{BreakpointResponse, Source, SourceBreakpoint};

/// A client-side breakpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    /// Source file path.
    pub path: PathBuf,
    /// Line number (1-based).
    pub line: i64,
    /// Optional condition expression.
    pub condition: Option<String>,
    /// Optional hit condition expression.
    pub hit_condition: Option<String>,
    /// Optional log message (logpoint).
    pub log_message: Option<String>,
    /// Whether the adapter has verified this breakpoint.
    pub verified: bool,
    /// Adapter-assigned ID (set after adapter response).
    pub adapter_id: Option<i64>,
    /// Line the adapter actually placed the breakpoint on, if it moved it.
    pub resolved_line: Option<i64>,
}

impl Breakpoint {
    /// Create a new unverified breakpoint at the given path and line.
    pub fn new(path: impl Into<PathBuf>, line: i64) -> Self {
        Self {
            path: path.into(),
            line,
            condition: None,
            hit_condition: None,
            log_message: None,
            verified: false,
            adapter_id: None,
            resolved_line: None,
        }
    }

    /// Add a condition expression.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Add a hit condition.
    pub fn with_hit_condition(mut self, hit_condition: impl Into<String>) -> Self {
        self.hit_condition = Some(hit_condition.into());
        self
    }

    /// Turn the breakpoint into a logpoint.
    pub fn with_log_message(mut self, msg: impl Into<String>) -> Self {
        self.log_message = Some(msg.into());
        self
    }

    fn to_source_breakpoint(&self) -> SourceBreakpoint {
        SourceBreakpoint {
            line: self.line,
            column: None,
            condition: self.condition.clone(),
            hit_condition: self.hit_condition.clone(),
            log_message: self.log_message.clone(),
        }
    }
}

/// Breakpoints of a debug session, grouped by file.
#[derive(Debug, Clone, Default)]
pub struct BreakpointManager {
    breakpoints: BTreeMap<PathBuf, Vec<Breakpoint>>,
}

impl BreakpointManager {
    /// Create a new empty breakpoint manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint, replacing any existing one on the same line.
    pub fn add(&mut self, bp: Breakpoint) {
        let list = self.breakpoints.entry(bp.path.clone()).or_default();
        list.retain(|existing| existing.line != bp.line);
        list.push(bp);
        list.sort_by_key(|b| b.line);
    }

    /// Replace every breakpoint of `path` with `bps`.
    ///
    /// Each breakpoint is re-homed to `path`. An empty list clears the file.
    pub fn replace_file(&mut self, path: &Path, bps: Vec<Breakpoint>) {
        self.breakpoints.remove(path);
        for mut bp in bps {
            bp.path = path.to_path_buf();
            self.add(bp);
        }
    }

    /// Remove the breakpoint at the given path and line.
    ///
    /// Returns `true` if a breakpoint was removed.
    pub fn remove(&mut self, path: &Path, line: i64) -> bool {
        let Some(list) = self.breakpoints.get_mut(path) else {
            return false;
        };
        let before = list.len();
        list.retain(|bp| bp.line != line);
        let removed = list.len() != before;
        if list.is_empty() {
            self.breakpoints.remove(path);
        }
        removed
    }

    /// Get all breakpoints for a file, ordered by line.
    pub fn get_for_file(&self, path: &Path) -> &[Breakpoint] {
        self.breakpoints.get(path).map_or(&[], |v| v.as_slice())
    }

    /// Files that have at least one breakpoint.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.breakpoints.keys().map(PathBuf::as_path)
    }

    /// Iterate over all breakpoints across all files.
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values().flat_map(|v| v.iter())
    }

    /// The `source` argument of a `setBreakpoints` request for `path`.
    pub fn source_for(path: &Path) -> Source {
        Source {
            name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            path: Some(path.to_string_lossy().into_owned()),
            source_reference: None,
        }
    }

    /// The `breakpoints` argument of a `setBreakpoints` request for `path`.
    pub fn source_breakpoints(&self, path: &Path) -> Vec<SourceBreakpoint> {
        self.get_for_file(path)
            .iter()
            .map(Breakpoint::to_source_breakpoint)
            .collect()
    }

    /// Apply the adapter's answer to `setBreakpoints` for `path`.
    ///
    /// The adapter answers in request order, one entry per breakpoint.
    pub fn apply_response(&mut self, path: &Path, results: &[BreakpointResponse]) {
        let Some(list) = self.breakpoints.get_mut(path) else {
            return;
        };
        if list.len() != results.len() {
            tracing::warn!(
                path = %path.display(),
                sent = list.len(),
                received = results.len(),
                "adapter answered setBreakpoints with a different count"
            );
        }
        for (bp, result) in list.iter_mut().zip(results) {
            bp.verified = result.verified;
            bp.adapter_id = result.id;
            bp.resolved_line = result.line.filter(|l| *l != bp.line);
            if !result.verified {
                tracing::warn!(
                    path = %path.display(),
                    line = bp.line,
                    message = result.message.as_deref().unwrap_or(""),
                    "breakpoint not verified"
                );
            }
        }
    }

    /// Number of breakpoints the adapter has verified.
    pub fn verified_count(&self) -> usize {
        self.all().filter(|bp| bp.verified).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path(name: &str) -> PathBuf {
        PathBuf::from(format!("/src/{name}"))
    }

    fn verified(id: i64, line: i64) -> BreakpointResponse {
        BreakpointResponse {
            id: Some(id),
            verified: true,
            message: None,
            source: None,
            line: Some(line),
        }
    }

    #[test]
    fn breakpoint_requests_are_line_ordered() {
        let mut mgr = BreakpointManager::new();
        let path = test_path("main.gno");
        mgr.add(Breakpoint::new(&path, 15));
        mgr.add(Breakpoint::new(&path, 6).with_condition("i == 3"));

        let sent = mgr.source_breakpoints(&path);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].line, 6);
        assert_eq!(sent[0].condition.as_deref(), Some("i == 3"));
        assert_eq!(sent[1].line, 15);

        let source = BreakpointManager::source_for(&path);
        assert_eq!(source.name.as_deref(), Some("main.gno"));
        assert_eq!(source.path.as_deref(), Some("/src/main.gno"));
    }

    #[test]
    fn breakpoint_same_line_replaces() {
        let mut mgr = BreakpointManager::new();
        let path = test_path("main.gno");
        mgr.add(Breakpoint::new(&path, 6));
        mgr.add(Breakpoint::new(&path, 6).with_log_message("x={x}"));
        let bps = mgr.get_for_file(&path);
        assert_eq!(bps.len(), 1);
        assert_eq!(bps[0].log_message.as_deref(), Some("x={x}"));
    }

    #[test]
    fn breakpoint_apply_response_marks_verified() {
        let mut mgr = BreakpointManager::new();
        let path = test_path("main.gno");
        mgr.add(Breakpoint::new(&path, 6));
        mgr.add(Breakpoint::new(&path, 15));

        let mut unverified = verified(2, 15);
        unverified.verified = false;
        mgr.apply_response(&path, &[verified(1, 7), unverified]);

        let bps = mgr.get_for_file(&path);
        assert!(bps[0].verified);
        assert_eq!(bps[0].adapter_id, Some(1));
        assert_eq!(bps[0].resolved_line, Some(7));
        assert!(!bps[1].verified);
        assert_eq!(bps[1].resolved_line, None);
        assert_eq!(mgr.verified_count(), 1);
    }

    #[test]
    fn breakpoint_apply_response_for_unknown_file_is_ignored() {
        let mut mgr = BreakpointManager::new();
        mgr.apply_response(&test_path("nope.gno"), &[verified(1, 1)]);
        assert_eq!(mgr.all().count(), 0);
    }

    #[test]
    fn breakpoint_remove() {
        let mut mgr = BreakpointManager::new();
        let path = test_path("main.gno");
        mgr.add(Breakpoint::new(&path, 10));
        mgr.add(Breakpoint::new(&path, 20));

        assert!(mgr.remove(&path, 10));
        assert_eq!(mgr.get_for_file(&path).len(), 1);
        assert!(!mgr.remove(&path, 999));

        assert!(mgr.remove(&path, 20));
        assert_eq!(mgr.files().count(), 0);
    }

    #[test]
    fn breakpoint_replace_file() {
        let mut mgr = BreakpointManager::new();
        let path = test_path("main.gno");
        mgr.add(Breakpoint::new(&path, 3));
        mgr.add(Breakpoint::new(test_path("other.gno"), 1));

        mgr.replace_file(
            &path,
            vec![Breakpoint::new("ignored.gno", 15), Breakpoint::new(&path, 6)],
        );
        let lines: Vec<i64> = mgr.get_for_file(&path).iter().map(|b| b.line).collect();
        assert_eq!(lines, vec![6, 15]);
        assert!(mgr.get_for_file(Path::new("ignored.gno")).is_empty());

        mgr.replace_file(&path, Vec::new());
        assert!(mgr.get_for_file(&path).is_empty());
        assert_eq!(mgr.all().count(), 1);
    }

    #[test]
    fn breakpoint_multiple_files() {
        let mut mgr = BreakpointManager::new();
        mgr.add(Breakpoint::new(test_path("b.gno"), 10));
        mgr.add(Breakpoint::new(test_path("a.gno"), 1));
        mgr.add(Breakpoint::new(test_path("a.gno"), 2).with_hit_condition("> 3"));

        let files: Vec<PathBuf> = mgr.files().map(Path::to_path_buf).collect();
        assert_eq!(files, vec![test_path("a.gno"), test_path("b.gno")]);
        assert_eq!(mgr.all().count(), 3);
    }
}
