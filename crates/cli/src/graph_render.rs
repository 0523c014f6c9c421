//! ASCII rendering of a flow graph with per-node status glyphs.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use engine::RunStatus;

fn glyph(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Passed => "✓",
        RunStatus::Failed | RunStatus::Error | RunStatus::TimedOut => "✗",
        RunStatus::Skipped => "⊘",
        RunStatus::Pending => "○",
        _ => "?",
    }
}

/// Render an adjacency map (id → dependents) as indented BFS levels with a
/// status glyph per node.
pub fn render_graph(
    graph: &BTreeMap<String, Vec<String>>,
    status_map: &HashMap<String, RunStatus>,
) -> String {
    // Roots: nodes that no edge points at.
    let mut children: HashSet<&str> = HashSet::new();
    for deps in graph.values() {
        children.extend(deps.iter().map(String::as_str));
    }
    let mut roots: Vec<&str> = graph
        .keys()
        .map(String::as_str)
        .filter(|id| !children.contains(id))
        .collect();
    if roots.is_empty() {
        roots = graph.keys().map(String::as_str).collect();
    }

    // BFS into display levels.
    let mut levels: Vec<Vec<&str>> = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<(&str, usize)> = roots.iter().map(|r| (*r, 0)).collect();

    while let Some((node, level)) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        while levels.len() <= level {
            levels.push(Vec::new());
        }
        levels[level].push(node);

        if let Some(next) = graph.get(node) {
            for child in next {
                if !visited.contains(child.as_str()) {
                    queue.push_back((child.as_str(), level + 1));
                }
            }
        }
    }

    let mut lines: Vec<String> = Vec::new();
    for (idx, level_nodes) in levels.iter().enumerate() {
        let rendered: Vec<String> = level_nodes
            .iter()
            .map(|node| {
                let status = status_map.get(*node).copied().unwrap_or_default();
                format!("[{}] {}", glyph(status), node)
            })
            .collect();
        lines.push(format!("  {}", rendered.join("    ")));

        if idx + 1 < levels.len() {
            lines.push("   │".into());
            lines.push("   ↓".into());
        }
    }

    lines.join("\n")
}
