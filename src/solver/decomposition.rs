//! Flow decomposition
//!
//! Splits an acyclic flow assignment into weighted source-to-sink paths by
//! walking positive flow from the source. The solvers cancel circulations
//! before returning, so every walk reaches the sink.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

use crate::cartographer::{hop_token, AccountId, Capacity, Vertex};

use super::{EdgeFlows, FlowDict, FlowPath, SimplifiedPath};

pub fn decompose(
    flow: &FlowDict,
    source: &Vertex,
    sink: &Vertex,
    cutoff: Option<Capacity>,
) -> (Vec<FlowPath>, EdgeFlows) {
    let mut remaining: HashMap<Vertex, BTreeMap<Vertex, Capacity>> = flow
        .iter()
        .map(|(u, out)| {
            let positive = out.iter().filter(|(_, &f)| f > 0).map(|(v, &f)| (*v, f)).collect();
            (*u, positive)
        })
        .collect();

    let mut paths = Vec::new();
    let mut edge_flows = EdgeFlows::new();
    let mut total: Capacity = 0;

    loop {
        let allowance = cutoff.map_or(Capacity::MAX, |c| c.saturating_sub(total));
        if allowance == 0 {
            break;
        }

        let Some(nodes) = walk(&remaining, source, sink) else {
            break;
        };

        let bottleneck = nodes
            .windows(2)
            .filter_map(|hop| remaining.get(&hop[0]).and_then(|out| out.get(&hop[1])))
            .copied()
            .min()
            .unwrap_or(0);
        let amount = bottleneck.min(allowance);
        if amount == 0 {
            break;
        }

        for hop in nodes.windows(2) {
            if let Some(out) = remaining.get_mut(&hop[0]) {
                if let Some(f) = out.get_mut(&hop[1]) {
                    *f -= amount;
                    if *f == 0 {
                        out.remove(&hop[1]);
                    }
                }
            }
            *edge_flows.entry((hop[0], hop[1])).or_default() += amount;
        }

        let tokens = nodes
            .windows(2)
            .filter_map(|hop| hop_token(&hop[0], &hop[1]))
            .collect();
        paths.push(FlowPath { nodes, tokens, amount });
        total += amount;
    }

    (paths, edge_flows)
}

/// Follow any positive outgoing flow from `source` until `sink` is reached
fn walk(
    remaining: &HashMap<Vertex, BTreeMap<Vertex, Capacity>>,
    source: &Vertex,
    sink: &Vertex,
) -> Option<Vec<Vertex>> {
    let mut nodes = vec![*source];
    let mut seen = HashSet::from([*source]);
    let mut current = *source;

    while current != *sink {
        let next = remaining
            .get(&current)
            .and_then(|out| out.iter().find(|(_, &f)| f > 0))
            .map(|(v, _)| *v)?;

        if !seen.insert(next) {
            warn!("Flow cycle through {} during decomposition", next);
            return None;
        }
        nodes.push(next);
        current = next;
    }

    Some(nodes)
}

/// Collapse each `holder -> (holder, token) -> receiver` pair into one
/// transfer of `token`. Paths with the same transfers are merged.
pub fn simplify_paths(paths: &[FlowPath]) -> Vec<SimplifiedPath> {
    let mut merged: Vec<SimplifiedPath> = Vec::new();
    let mut positions: HashMap<(Vec<AccountId>, Vec<AccountId>), usize> = HashMap::new();

    for path in paths {
        let Some(first) = path.nodes.first() else {
            continue;
        };

        let mut accounts = vec![first.account()];
        let mut tokens = Vec::new();
        for hop in path.nodes.windows(2) {
            if hop[1].is_intermediate() {
                continue;
            }
            accounts.push(hop[1].account());
            if let Some(token) = hop_token(&hop[0], &hop[1]) {
                tokens.push(token);
            }
        }

        let key = (accounts, tokens);
        match positions.get(&key) {
            Some(&i) => merged[i].amount += path.amount,
            None => {
                positions.insert(key.clone(), merged.len());
                merged.push(SimplifiedPath {
                    accounts: key.0,
                    tokens: key.1,
                    amount: path.amount,
                });
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> FlowDict {
        // A(0) -> A_0 -> B(1) -> B_1 -> C(2), 100 units
        let mut flow = FlowDict::new();
        flow.entry(Vertex::Account(0)).or_default().insert(Vertex::holding(0, 0), 100);
        flow.entry(Vertex::holding(0, 0)).or_default().insert(Vertex::Account(1), 100);
        flow.entry(Vertex::Account(1)).or_default().insert(Vertex::holding(1, 1), 100);
        flow.entry(Vertex::holding(1, 1)).or_default().insert(Vertex::Account(2), 100);
        flow
    }

    #[test]
    fn test_single_path() {
        let (paths, edges) = decompose(&chain(), &Vertex::Account(0), &Vertex::Account(2), None);

        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].amount, 100);
        assert_eq!(
            paths[0].nodes,
            vec![
                Vertex::Account(0),
                Vertex::holding(0, 0),
                Vertex::Account(1),
                Vertex::holding(1, 1),
                Vertex::Account(2),
            ]
        );
        assert_eq!(paths[0].tokens, vec![0, 0, 1, 1]);
        assert_eq!(edges.len(), 4);
        assert!(edges.values().all(|&f| f == 100));
    }

    #[test]
    fn test_cutoff_clips_paths() {
        let (paths, edges) = decompose(&chain(), &Vertex::Account(0), &Vertex::Account(2), Some(30));
        assert_eq!(paths.iter().map(|p| p.amount).sum::<Capacity>(), 30);
        assert!(edges.values().all(|&f| f == 30));
    }

    #[test]
    fn test_split_flow_reproduces_edge_flows() {
        // 0 splits to holdings trusted by 1 and 2, both end at 3
        let mut flow = FlowDict::new();
        let s = Vertex::Account(0);
        let t = Vertex::Account(3);
        flow.entry(s).or_default().insert(Vertex::holding(0, 0), 7);
        flow.entry(Vertex::holding(0, 0)).or_default().insert(Vertex::Account(1), 4);
        flow.entry(Vertex::holding(0, 0)).or_default().insert(Vertex::Account(2), 3);
        flow.entry(Vertex::Account(1)).or_default().insert(Vertex::holding(1, 1), 4);
        flow.entry(Vertex::Account(2)).or_default().insert(Vertex::holding(2, 2), 3);
        flow.entry(Vertex::holding(1, 1)).or_default().insert(t, 4);
        flow.entry(Vertex::holding(2, 2)).or_default().insert(t, 3);

        let (paths, edges) = decompose(&flow, &s, &t, None);
        assert_eq!(paths.len(), 2);
        for (u, out) in &flow {
            for (v, f) in out {
                assert_eq!(edges.get(&(*u, *v)), Some(f));
            }
        }
    }

    #[test]
    fn test_simplify_collapses_holding_hops() {
        let (paths, _) = decompose(&chain(), &Vertex::Account(0), &Vertex::Account(2), None);
        let simplified = simplify_paths(&paths);

        assert_eq!(
            simplified,
            vec![SimplifiedPath { accounts: vec![0, 1, 2], tokens: vec![0, 1], amount: 100 }]
        );
    }

    #[test]
    fn test_simplify_merges_identical_transfers() {
        let path = FlowPath {
            nodes: vec![Vertex::Account(0), Vertex::holding(0, 4), Vertex::Account(1)],
            tokens: vec![4, 4],
            amount: 5,
        };
        let simplified = simplify_paths(&[path.clone(), path]);
        assert_eq!(simplified.len(), 1);
        assert_eq!(simplified[0].amount, 10);
    }
}
