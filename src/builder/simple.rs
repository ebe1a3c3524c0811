// src/builder/simple.rs

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use tracing::debug;

use crate::cache::{Fingerprint, GraphNode, fingerprint_graph};
use crate::compilation::{Chunk, Compilation, Diagnostic, DiagnosticKind, Module};
use crate::errors::{CompileError, Result};

use super::resolve::{Resolution, resolve};
use super::runtime::{REQUIRE_FN, js_string, render_chunk, render_module};
use super::{BuildContext, BuildFuture, GraphBuilder};

static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\s*\(\s*(?:"([^"\\\n]*)"|'([^'\\\n]*)')\s*\)"#)
        .expect("require pattern is valid")
});

static DYNAMIC_REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\s*\(\s*[^"'\s)]"#).expect("dynamic require pattern is valid")
});

/// CommonJS bundler: follows string-literal `require` calls from each entry
/// and writes one self-contained file per entry.
#[derive(Debug, Clone, Default)]
pub struct SimpleGraphBuilder;

impl SimpleGraphBuilder {
    pub fn new() -> Self {
        Self
    }
}

struct ParsedModule {
    path: PathBuf,
    source: String,
    /// `(request, resolved identifier)` in source order.
    requests: Vec<(String, Option<String>)>,
}

impl ParsedModule {
    fn dependency_ids(&self) -> impl Iterator<Item = &String> {
        self.requests.iter().filter_map(|(_, id)| id.as_ref())
    }
}

/// Context-relative identifier (`./src/a.js`); paths outside the context
/// keep their absolute form.
pub fn module_id(context: &Path, path: &Path) -> String {
    match path.strip_prefix(context) {
        Ok(rel) => format!("./{}", rel.to_string_lossy().replace('\\', "/")),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

/// String-literal requests in source order.
pub fn extract_requires(source: &str) -> Vec<String> {
    REQUIRE_RE
        .captures_iter(source)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn rewrite_requires(source: &str, resolved: &BTreeMap<&str, &str>) -> String {
    REQUIRE_RE
        .replace_all(source, |caps: &Captures<'_>| {
            let request = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match resolved.get(request) {
                Some(id) => format!("{REQUIRE_FN}({})", js_string(id)),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

impl GraphBuilder for SimpleGraphBuilder {
    fn build<'a>(
        &'a self,
        ctx: BuildContext<'a>,
        compilation: &'a mut Compilation,
    ) -> BuildFuture<'a> {
        Box::pin(async move { build_graph(ctx, compilation) })
    }
}

fn build_graph(ctx: BuildContext<'_>, compilation: &mut Compilation) -> Result<()> {
    let context = ctx.options.context.as_path();
    let fs = ctx.input_file_system;

    if !ctx.changes.is_empty() {
        debug!(
            changed = ctx.changes.changed.len(),
            removed = ctx.changes.removed.len(),
            "rebuilding after file changes"
        );
    }

    let mut entries: Vec<(String, String)> = Vec::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();

    for (name, request) in &ctx.options.entry {
        match resolve(fs, context, request) {
            Resolution::Found(path) => {
                entries.push((name.clone(), module_id(context, &path)));
                queue.push_back(path);
            }
            Resolution::NotFound(tried) => {
                for path in tried {
                    compilation.add_missing_dependency(path);
                }
                compilation.push_error(Diagnostic::module_not_found(request, context));
            }
        }
    }

    let mut parsed: BTreeMap<String, ParsedModule> = BTreeMap::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    while let Some(path) = queue.pop_front() {
        if !seen.insert(path.clone()) {
            continue;
        }
        let id = module_id(context, &path);
        let bytes = fs.read(&path).map_err(|e| CompileError::io(&path, e))?;
        compilation.add_file_dependency(&path);

        let source = match String::from_utf8(bytes) {
            Ok(source) => source,
            Err(err) => {
                compilation.push_error(
                    Diagnostic::new(
                        DiagnosticKind::ModuleBuild,
                        format!("Module build failed: {}", err.utf8_error()),
                    )
                    .with_module(&id),
                );
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };

        if DYNAMIC_REQUIRE_RE.is_match(&source) {
            compilation.push_warning(
                Diagnostic::new(
                    DiagnosticKind::ModuleBuild,
                    "Critical dependency: the request of a dependency is an expression",
                )
                .with_module(&id),
            );
        }

        let dir = path.parent().unwrap_or(context).to_path_buf();
        let mut requests = Vec::new();
        for request in extract_requires(&source) {
            match resolve(fs, &dir, &request) {
                Resolution::Found(dep) => {
                    requests.push((request, Some(module_id(context, &dep))));
                    queue.push_back(dep);
                }
                Resolution::NotFound(tried) => {
                    for missing in tried {
                        compilation.add_missing_dependency(missing);
                    }
                    compilation
                        .push_error(Diagnostic::module_not_found(&request, &dir).with_module(&id));
                    requests.push((request, None));
                }
            }
        }

        parsed.insert(
            id,
            ParsedModule {
                path,
                source,
                requests,
            },
        );
    }

    let nodes: Vec<GraphNode> = parsed
        .iter()
        .map(|(id, m)| GraphNode {
            id: id.clone(),
            content: Fingerprint::of(m.source.as_bytes()),
            dependencies: m.dependency_ids().cloned().collect(),
        })
        .collect();
    let fingerprints = fingerprint_graph(&nodes);

    let mut artifacts: BTreeMap<String, Arc<str>> = BTreeMap::new();
    let mut cached_count = 0usize;

    for (id, m) in &parsed {
        let fingerprint = fingerprints
            .get(id)
            .copied()
            .unwrap_or_else(|| Fingerprint::of(m.source.as_bytes()));

        let produce = || -> Result<Arc<str>> {
            let resolved: BTreeMap<&str, &str> = m
                .requests
                .iter()
                .filter_map(|(req, dep)| dep.as_deref().map(|d| (req.as_str(), d)))
                .collect();
            Ok(Arc::from(render_module(id, &rewrite_requires(&m.source, &resolved))))
        };

        let (artifact, cached) = match ctx.cache {
            Some(cache) => cache.get_or_insert_with(id, fingerprint, compilation.id(), produce)?,
            None => (produce()?, false),
        };
        if cached {
            cached_count += 1;
        }

        artifacts.insert(id.clone(), Arc::clone(&artifact));
        compilation.add_module(Module {
            identifier: id.clone(),
            resource: m.path.clone(),
            dependencies: m.dependency_ids().cloned().collect(),
            fingerprint,
            artifact,
            cached,
        });
    }

    debug!(
        modules = parsed.len(),
        cached = cached_count,
        "module graph built"
    );

    for (name, entry_id) in entries {
        let reachable = reachable_from(&entry_id, &parsed);
        let table: BTreeMap<&str, &str> = reachable
            .iter()
            .filter_map(|id| artifacts.get(id).map(|a| (id.as_str(), &**a)))
            .collect();
        let content = render_chunk(&entry_id, &table);
        let file = ctx.options.output.filename_for(&name);

        compilation.emit_asset(file.clone(), content.into_bytes());
        compilation.add_chunk(Chunk {
            name,
            entry_module: entry_id,
            modules: reachable.into_iter().collect(),
            files: vec![file],
        });
    }

    Ok(())
}

fn reachable_from(entry: &str, parsed: &BTreeMap<String, ParsedModule>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![entry.to_string()];
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(m) = parsed.get(&id) {
            stack.extend(m.dependency_ids().cloned());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_both_quote_styles_in_order() {
        let src = r#"
            var a = require("./a");
            var b = require( './b' );
            var c = requireNot("./c");
            var d = require(name);
        "#;
        assert_eq!(extract_requires(src), vec!["./a", "./b"]);
        assert!(DYNAMIC_REQUIRE_RE.is_match(src));
    }

    #[test]
    fn rewrites_only_resolved_requests() {
        let src = r#"require("./a"); require('missing');"#;
        let resolved = BTreeMap::from([("./a", "./src/a.js")]);
        assert_eq!(
            rewrite_requires(src, &resolved),
            r#"__packwatch_require__("./src/a.js"); require('missing');"#
        );
    }

    #[test]
    fn module_ids_are_context_relative() {
        assert_eq!(module_id(Path::new("/p"), Path::new("/p/src/a.js")), "./src/a.js");
        assert_eq!(module_id(Path::new("/p"), Path::new("/q/a.js")), "/q/a.js");
    }
}
