//! Path predicates built from lists of glob patterns.

use std::fs;
use std::path::Path;

use super::glob::Glob;
use crate::config::parse_list;
use crate::error::{Error, Result};

const GLOB_PREFIX: &str = "glob:";
const REGEX_PREFIX: &str = "regex:";

/// Reads one pattern per line from a file, ignoring blank lines.
pub fn read_pattern_file(plugin: &str, file: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(file)
        .map_err(|e| Error::config(plugin, format!("cannot read {}: {}", file.display(), e)))?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned).collect())
}

/// Expands `@file` entries of a comma separated pattern list.
pub fn expand_patterns(plugin: &str, value: &str) -> Result<Vec<String>> {
    let mut patterns = Vec::new();
    for item in parse_list(value) {
        if item.starts_with('@') {
            patterns.extend(read_pattern_file(plugin, Path::new(&item[1..]))?);
        } else {
            patterns.push(item);
        }
    }
    Ok(patterns)
}

pub fn compile(plugin: &str, pattern: &str) -> Result<Glob> {
    if pattern.starts_with(REGEX_PREFIX) {
        return Err(Error::config(plugin, format!("regular expression patterns are not supported: {}", pattern)));
    }
    let pattern = if pattern.starts_with(GLOB_PREFIX) { &pattern[GLOB_PREFIX.len()..] } else { pattern };
    Glob::new(pattern).map_err(|e| Error::config(plugin, e.to_string()))
}

#[derive(Debug, Clone)]
struct Pattern {
    glob: Glob,
    /// Patterns without a `/` also match against the bare file name.
    by_name: bool,
}

impl Pattern {
    fn matches(&self, path: &str) -> bool {
        if self.glob.matches(path) {
            return true;
        }
        self.by_name && path.rfind('/').map(|i| self.glob.matches(&path[i + 1..])).unwrap_or(false)
    }
}

/// Accepts the paths that match one of its patterns or, when negated, the
/// paths that match none.
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    patterns: Vec<Pattern>,
    negate: bool,
}

impl ResourceFilter {
    fn new(plugin: &str, value: &str, negate: bool) -> Result<Self> {
        let mut patterns = Vec::new();
        for p in expand_patterns(plugin, value)? {
            let glob = compile(plugin, &p)?;
            let by_name = !glob.as_str().contains('/');
            patterns.push(Pattern { glob, by_name });
        }
        Ok(ResourceFilter { patterns, negate })
    }

    pub fn include(plugin: &str, value: &str) -> Result<Self> {
        ResourceFilter::new(plugin, value, false)
    }

    pub fn exclude(plugin: &str, value: &str) -> Result<Self> {
        ResourceFilter::new(plugin, value, true)
    }

    pub fn test(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path)) != self.negate
    }

    /// The index of the first pattern matching `path`.
    pub fn rank(&self, path: &str) -> Option<usize> {
        self.patterns.iter().position(|p| p.matches(path))
    }
}
