//! Path algebra over state locations.
//!
//! Every state is addressed by its absolute path from the synthetic `root`
//! segment. Transition targets are written relative to the source state and
//! resolved here; exit and entry sequencing is derived from the lowest
//! common ancestor of source and destination.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// An absolute state location, always rooted at the `root` segment.
/// Segments are unique among siblings but not globally.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StatePath(Vec<String>);

impl StatePath {
    pub fn root() -> Self {
        Self(vec!["root".to_owned()])
    }

    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Last segment; the state's short name.
    pub fn tail(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_owned());
        Self(segments)
    }

    /// The first `depth` segments.
    pub fn prefix(&self, depth: usize) -> Self {
        Self(self.0[..depth.min(self.0.len())].to_vec())
    }

    /// Segment at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Identifier-safe flattened name: all segments joined with `sep`,
    /// with anything outside `[A-Za-z0-9_]` mapped to `_` so that dashed
    /// or otherwise decorated state names still produce valid symbols.
    pub fn flat(&self, sep: &str) -> String {
        let joined = self.0.join(sep);
        joined
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    }

    /// Human-readable form: `/a/b`, or `/` for the root itself.
    pub fn display(&self) -> String {
        if self.is_root() {
            "/".to_owned()
        } else {
            format!("/{}", self.0[1..].join("/"))
        }
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Resolve a target spec against the source state's path.
///
/// Grammar: `/a/b` absolute, `root/a` legacy absolute, `./x` child
/// relative, `./` or `.` self, `../x` parent relative (climbs two levels:
/// one for self, one for the parent scope), anything else sibling relative.
pub fn resolve_target(current: &StatePath, spec: &str) -> StatePath {
    if spec.is_empty() {
        return current.clone();
    }

    if let Some(rest) = spec.strip_prefix('/') {
        let parts: Vec<String> = rest.trim_matches('/').split('/').map(str::to_owned).collect();
        if parts.first().map(String::as_str) == Some("root") {
            return StatePath::new(parts);
        }
        let mut segments = vec!["root".to_owned()];
        segments.extend(parts);
        return StatePath::new(segments);
    }

    if spec.starts_with("root/") {
        return StatePath::new(spec.split('/').map(str::to_owned).collect());
    }

    if spec == "." || spec == "./" {
        return current.clone();
    }

    if spec.starts_with("../") {
        let scope = current.len().saturating_sub(2);
        let mut segments = current.segments()[..scope].to_vec();
        let rest = spec.replace("../", "");
        segments.extend(rest.split('/').map(str::to_owned));
        return StatePath::new(segments);
    }

    if let Some(rest) = spec.strip_prefix("./") {
        let mut segments = current.segments().to_vec();
        segments.extend(rest.split('/').map(str::to_owned));
        return StatePath::new(segments);
    }

    // Sibling: strip self, append the target segments.
    let mut segments = current.segments()[..current.len() - 1].to_vec();
    segments.extend(spec.split('/').map(str::to_owned));
    StatePath::new(segments)
}

/// Number of leading segments `a` and `b` share. When the paths are equal
/// the result is one less than their length, so a self-transition still
/// exits and re-enters the state itself.
pub fn lca_index(a: &StatePath, b: &StatePath) -> usize {
    let min_len = a.len().min(b.len());
    let mut index = 0;
    while index < min_len && a.segments()[index] == b.segments()[index] {
        index += 1;
    }
    if index == a.len() && index == b.len() {
        index -= 1;
    }
    index
}

/// States to exit when moving from `src` to `dst`: the source and each
/// ancestor down to the LCA depth, deepest first.
pub fn exit_sequence(src: &StatePath, dst: &StatePath) -> Vec<StatePath> {
    let lca = lca_index(src, dst);
    (lca..src.len()).rev().map(|i| src.prefix(i + 1)).collect()
}

/// How a state on the entry path is entered: `Start` runs only that
/// state's own entry code, `Entry` also descends to the initial (or
/// history) child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Start,
    Entry,
}

/// States to enter when moving from `src` to `dst`, shallowest first.
/// Every element but the last is entered with `Start`; the last gets the
/// full `Entry`. When the source is an ancestor of the destination the
/// LCA clamps to one above the destination so the destination itself is
/// still entered.
pub fn entry_sequence(src: &StatePath, dst: &StatePath) -> Vec<(StatePath, EntryKind)> {
    let mut lca = lca_index(src, dst);
    if lca == dst.len() {
        lca = dst.len() - 1;
    }
    (lca..dst.len())
        .map(|i| {
            let kind = if i == dst.len() - 1 { EntryKind::Entry } else { EntryKind::Start };
            (dst.prefix(i + 1), kind)
        })
        .collect()
}

static FORK_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*)/\[(.*)\]$").unwrap());

/// Split a target spec into its base path and optional fork branches:
/// `/a/b/[x,y/z]` becomes `("/a/b", Some(["x", "y/z"]))`.
pub fn parse_fork(spec: &str) -> (String, Option<Vec<String>>) {
    if let Some(caps) = FORK_SUFFIX.captures(spec) {
        let branches = caps[2].split(',').map(|b| b.trim().to_owned()).collect();
        (caps[1].to_owned(), Some(branches))
    } else {
        (spec.to_owned(), None)
    }
}
