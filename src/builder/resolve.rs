// src/builder/resolve.rs

//! Request resolution for CommonJS `require` specifiers.

use std::path::{Component, Path, PathBuf};

use crate::fs::InputFileSystem;

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    /// Every candidate that was probed, in probe order.
    NotFound(Vec<PathBuf>),
}

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding segment. Does not touch the file system.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

fn is_relative_request(request: &str) -> bool {
    request == "."
        || request == ".."
        || request.starts_with("./")
        || request.starts_with("../")
}

/// Candidates for one base path: the path itself, `<path>.js`, and
/// `<path>/index.js`.
fn candidates(base: &Path) -> [PathBuf; 3] {
    let mut with_ext = base.as_os_str().to_owned();
    with_ext.push(".js");
    [
        base.to_path_buf(),
        PathBuf::from(with_ext),
        base.join("index.js"),
    ]
}

fn probe(
    fs: &dyn InputFileSystem,
    base: &Path,
    tried: &mut Vec<PathBuf>,
) -> Option<PathBuf> {
    for candidate in candidates(&normalize(base)) {
        if fs.is_file(&candidate) {
            return Some(candidate);
        }
        tried.push(candidate);
    }
    None
}

/// Resolve `request` as seen from a module living in `issuer_dir`.
///
/// - `./x`, `../x`: relative to `issuer_dir`.
/// - `/abs/x`: as is.
/// - `pkg`, `pkg/sub`: `node_modules/<request>` in `issuer_dir` and each of
///   its ancestors, nearest first.
pub fn resolve(fs: &dyn InputFileSystem, issuer_dir: &Path, request: &str) -> Resolution {
    let mut tried = Vec::new();

    if is_relative_request(request) {
        if let Some(found) = probe(fs, &issuer_dir.join(request), &mut tried) {
            return Resolution::Found(found);
        }
        return Resolution::NotFound(tried);
    }

    if Path::new(request).is_absolute() {
        if let Some(found) = probe(fs, Path::new(request), &mut tried) {
            return Resolution::Found(found);
        }
        return Resolution::NotFound(tried);
    }

    let mut dir = Some(issuer_dir);
    while let Some(d) = dir {
        if d.file_name().is_some_and(|n| n == "node_modules") {
            dir = d.parent();
            continue;
        }
        let base = d.join("node_modules").join(request);
        if let Some(found) = probe(fs, &base, &mut tried) {
            return Resolution::Found(found);
        }
        dir = d.parent();
    }
    Resolution::NotFound(tried)
}
