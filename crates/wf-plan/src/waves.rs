//! Wave partitioning — topological-level decomposition of the intent DAG.
//!
//! Wave 0 holds every intent with no predecessors; wave `k` holds intents
//! whose predecessors all sit in waves `< k`. This module is the single
//! authoritative source of the wave index used for deadline accounting and
//! executor ordering.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use wf_core::graph::{GraphError, IntentGraph};
use wf_core::types::Intent;

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Partition the graph into parallel execution waves (Kahn's algorithm by
/// BFS level). Ids within a wave are sorted, so the partition is a pure
/// function of the graph.
///
/// Errors with [`GraphError::Cycle`] (naming one concrete cycle path) when
/// the dependency graph is not a DAG.
pub fn partition(graph: &IntentGraph) -> Result<Vec<Vec<String>>, GraphError> {
    if graph.is_empty() {
        return Ok(Vec::new());
    }

    let mut in_degree: HashMap<&str, usize> = graph
        .iter()
        .map(|i| (i.id.as_str(), i.depends.len()))
        .collect();

    let mut current: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    current.sort_unstable();

    let mut waves: Vec<Vec<String>> = Vec::new();
    let mut assigned = 0usize;

    while !current.is_empty() {
        assigned += current.len();
        waves.push(current.iter().map(|&id| id.to_owned()).collect());

        let mut next: Vec<&str> = Vec::new();
        for &id in &current {
            for dependent in graph.dependents_of(id) {
                let deg = in_degree
                    .get_mut(dependent)
                    .expect("dependent id comes from the graph");
                *deg -= 1;
                if *deg == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        current = next;
    }

    if assigned < graph.len() {
        let path = graph
            .find_cycle()
            .expect("unassigned intents imply a cycle");
        return Err(GraphError::Cycle { path });
    }

    Ok(waves)
}

/// Flatten a wave layout into an id → wave-index map.
pub fn wave_index(waves: &[Vec<String>]) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (k, wave) in waves.iter().enumerate() {
        for id in wave {
            map.insert(id.clone(), k);
        }
    }
    map
}

// ---------------------------------------------------------------------------
// WaveStats
// ---------------------------------------------------------------------------

/// Summary statistics for a wave decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveStats {
    pub total_intents: usize,
    pub total_waves: usize,
    /// Largest wave size — the widest the execution ever gets.
    pub peak_parallelism: usize,
    /// Number of waves; the floor on end-to-end makespan.
    pub serial_depth: usize,
    /// Index of the largest wave (smallest index on ties).
    pub bottleneck_wave: usize,
    /// Heaviest dependency chain under the supplied duration weight.
    pub critical_path: Vec<String>,
}

/// Compute summary statistics over a wave decomposition. `duration` supplies
/// the per-intent weight for the critical path (estimated duration once an
/// agent is chosen; hop count if the caller passes a constant).
pub fn analyze<F>(graph: &IntentGraph, waves: &[Vec<String>], duration: F) -> WaveStats
where
    F: Fn(&Intent) -> f64,
{
    if waves.is_empty() {
        return WaveStats {
            total_intents: 0,
            total_waves: 0,
            peak_parallelism: 0,
            serial_depth: 0,
            bottleneck_wave: 0,
            critical_path: Vec::new(),
        };
    }

    let sizes: Vec<usize> = waves.iter().map(Vec::len).collect();
    let peak = *sizes.iter().max().expect("waves are non-empty");
    let bottleneck = sizes
        .iter()
        .position(|&s| s == peak)
        .expect("peak comes from sizes");

    WaveStats {
        total_intents: sizes.iter().sum(),
        total_waves: waves.len(),
        peak_parallelism: peak,
        serial_depth: waves.len(),
        bottleneck_wave: bottleneck,
        critical_path: graph.heaviest_chain(duration),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::types::Complexity;

    fn intent(id: &str, deps: &[&str]) -> Intent {
        Intent::new(id, Complexity::Simple).with_depends(deps.iter().copied())
    }

    fn graph(intents: Vec<Intent>) -> IntentGraph {
        IntentGraph::new(intents).unwrap()
    }

    #[test]
    fn empty_graph_has_no_waves() {
        let waves = partition(&graph(vec![])).unwrap();
        assert!(waves.is_empty());
    }

    #[test]
    fn single_intent_is_one_wave() {
        let waves = partition(&graph(vec![intent("only", &[])])).unwrap();
        assert_eq!(waves, vec![vec!["only".to_string()]]);
    }

    #[test]
    fn chain_of_n_yields_n_waves() {
        let g = graph(vec![
            intent("a", &[]),
            intent("b", &["a"]),
            intent("c", &["b"]),
        ]);
        let waves = partition(&g).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["a"]);
        assert_eq!(waves[1], vec!["b"]);
        assert_eq!(waves[2], vec!["c"]);

        let stats = analyze(&g, &waves, |_| 1.0);
        assert_eq!(stats.peak_parallelism, 1);
        assert_eq!(stats.serial_depth, 3);
    }

    #[test]
    fn disconnected_intents_share_one_wave() {
        let g = graph(vec![
            intent("c", &[]),
            intent("a", &[]),
            intent("b", &[]),
        ]);
        let waves = partition(&g).unwrap();
        assert_eq!(waves.len(), 1);
        // Sorted within the wave.
        assert_eq!(waves[0], vec!["a", "b", "c"]);

        let stats = analyze(&g, &waves, |_| 1.0);
        assert_eq!(stats.peak_parallelism, 3);
        assert_eq!(stats.serial_depth, 1);
    }

    #[test]
    fn diamond_dependency_layout() {
        // a -> {b, c} -> d
        let g = graph(vec![
            intent("a", &[]),
            intent("b", &["a"]),
            intent("c", &["a"]),
            intent("d", &["b", "c"]),
        ]);
        let waves = partition(&g).unwrap();
        assert_eq!(waves[0], vec!["a"]);
        assert_eq!(waves[1], vec!["b", "c"]);
        assert_eq!(waves[2], vec!["d"]);
    }

    #[test]
    fn every_edge_crosses_waves_forward() {
        let g = graph(vec![
            intent("root", &[]),
            intent("mid1", &["root"]),
            intent("mid2", &["root"]),
            intent("leaf", &["mid1", "mid2"]),
            intent("solo", &[]),
        ]);
        let waves = partition(&g).unwrap();
        let index = wave_index(&waves);
        for (from, to) in g.edges() {
            assert!(index[from] < index[to], "edge {from}->{to} not forward");
        }
    }

    #[test]
    fn cycle_reports_a_path() {
        let g = graph(vec![
            intent("a", &["c"]),
            intent("b", &["a"]),
            intent("c", &["b"]),
        ]);
        match partition(&g).unwrap_err() {
            GraphError::Cycle { path } => {
                assert_eq!(path.len(), 3);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn partition_is_deterministic() {
        let build = || {
            graph(vec![
                intent("z", &[]),
                intent("m", &[]),
                intent("a", &["z", "m"]),
                intent("q", &["m"]),
            ])
        };
        let first = partition(&build()).unwrap();
        let second = partition(&build()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn bottleneck_takes_smallest_index_on_tie() {
        let g = graph(vec![
            intent("a", &[]),
            intent("b", &[]),
            intent("c", &["a"]),
            intent("d", &["b"]),
        ]);
        let waves = partition(&g).unwrap();
        let stats = analyze(&g, &waves, |_| 1.0);
        assert_eq!(stats.peak_parallelism, 2);
        assert_eq!(stats.bottleneck_wave, 0);
    }

    #[test]
    fn critical_path_uses_duration_weight() {
        let g = graph(vec![
            intent("short1", &[]),
            intent("short2", &["short1"]),
            intent("short3", &["short2"]),
            Intent::new("heavy", Complexity::Epic).with_tokens(60_000),
        ]);
        let waves = partition(&g).unwrap();
        let stats = analyze(&g, &waves, |i| i.estimated_tokens as f64);
        assert_eq!(stats.critical_path, vec!["heavy"]);
    }
}
