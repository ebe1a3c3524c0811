// src/watch/patterns.rs

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled `watch_options.ignored` globs.
///
/// Patterns are matched against the path relative to the compiler context
/// (forward slashes) and against the absolute path, so both
/// `"**/node_modules/**"` and `"/tmp/out/**"` style patterns work.
#[derive(Clone)]
pub struct IgnoreMatcher {
    patterns: Vec<String>,
    set: Option<GlobSet>,
}

impl fmt::Debug for IgnoreMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreMatcher")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl IgnoreMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let set = if patterns.is_empty() {
            None
        } else {
            Some(build_globset(patterns).context("building ignore globset")?)
        };
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    pub fn is_ignored(&self, context: &Path, path: &Path) -> bool {
        let Some(set) = &self.set else {
            return false;
        };
        if set.is_match(path) {
            return true;
        }
        match relative_str(context, path) {
            Some(rel) => set.is_match(rel),
            None => false,
        }
    }
}

/// Validate a single pattern without building a set.
pub fn check_pattern(pattern: &str) -> Result<()> {
    Glob::new(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;
    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// `path` relative to `root` with forward slashes, if it lies below it.
fn relative_str(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_relative_and_absolute_patterns() {
        let m = IgnoreMatcher::new(&[
            "**/node_modules/**".to_string(),
            "/tmp/out/**".to_string(),
            "*.log".to_string(),
        ])
        .unwrap();
        let ctx = Path::new("/project");

        assert!(m.is_ignored(ctx, Path::new("/project/node_modules/m1/a.js")));
        assert!(m.is_ignored(ctx, Path::new("/tmp/out/main.js")));
        assert!(m.is_ignored(ctx, Path::new("/project/debug.log")));
        assert!(!m.is_ignored(ctx, Path::new("/project/src/a.js")));
    }

    #[test]
    fn empty_matcher_ignores_nothing() {
        let m = IgnoreMatcher::new(&[]).unwrap();
        assert!(!m.is_ignored(Path::new("/"), Path::new("/anything")));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(IgnoreMatcher::new(&["a[".to_string()]).is_err());
        assert!(check_pattern("src/**/*.js").is_ok());
    }
}
