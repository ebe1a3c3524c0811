// src/cache/fingerprint.rs

//! Content fingerprints used as cache keys.
//!
//! A module's fingerprint covers its own content and, transitively, the
//! fingerprints of everything it depends on. Editing one file therefore
//! changes the fingerprint of that module and of every module that reaches
//! it, while siblings keep theirs.

use std::collections::HashMap;
use std::fmt;

use blake3::Hasher;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash raw content.
    pub fn of(content: &[u8]) -> Self {
        Self(*blake3::hash(content).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// First 8 hex characters; enough for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Input to [`fingerprint_graph`]: one module and its direct dependencies.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub content: Fingerprint,
    pub dependencies: Vec<String>,
}

/// Compute transitive fingerprints for every node.
///
/// Dependencies naming ids that are not in `nodes` (unresolved requests) do
/// not contribute. Import cycles are hashed as one unit: every member of a
/// strongly connected component depends on the combined content of the
/// whole component plus its own id.
pub fn fingerprint_graph(nodes: &[GraphNode]) -> HashMap<String, Fingerprint> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(nodes.len(), 0);
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        index_of.insert(node.id.as_str(), graph.add_node(i));
    }
    for node in nodes {
        let from = index_of[node.id.as_str()];
        for dep in &node.dependencies {
            if let Some(&to) = index_of.get(dep.as_str()) {
                graph.update_edge(from, to, ());
            }
        }
    }

    let mut result: HashMap<String, Fingerprint> = HashMap::with_capacity(nodes.len());

    // Postorder: an SCC is yielded only after every SCC it points to.
    for scc in tarjan_scc(&graph) {
        let mut members: Vec<&GraphNode> = scc.iter().map(|&ix| &nodes[graph[ix]]).collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        let member_ids: Vec<&str> = members.iter().map(|m| m.id.as_str()).collect();

        let mut external: Vec<(&str, Fingerprint)> = Vec::new();
        for member in &members {
            for dep in &member.dependencies {
                if member_ids.contains(&dep.as_str()) {
                    continue;
                }
                if let Some(fp) = result.get(dep.as_str()) {
                    external.push((dep.as_str(), *fp));
                }
            }
        }
        external.sort();
        external.dedup();

        let cyclic = members.len() > 1 || {
            let ix = scc[0];
            graph.contains_edge(ix, ix)
        };

        let mut hasher = Hasher::new();
        hasher.update(if cyclic { b"scc" } else { b"mod" });
        for member in &members {
            hasher.update(member.id.as_bytes());
            hasher.update(&[0]);
            hasher.update(member.content.as_bytes());
        }
        for (id, fp) in &external {
            hasher.update(id.as_bytes());
            hasher.update(&[0]);
            hasher.update(fp.as_bytes());
        }
        let unit = Fingerprint(*hasher.finalize().as_bytes());

        if cyclic {
            for member in &members {
                let mut hasher = Hasher::new();
                hasher.update(unit.as_bytes());
                hasher.update(member.id.as_bytes());
                result.insert(member.id.clone(), Fingerprint(*hasher.finalize().as_bytes()));
            }
        } else {
            result.insert(members[0].id.clone(), unit);
        }
    }

    result
}
