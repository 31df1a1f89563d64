//! FIFO preflow-push (Goldberg-Tarjan)
//!
//! Active nodes are discharged in FIFO order with current-arc pointers.
//! Excess that cannot reach the sink climbs above `n` and drains back to the
//! source, so the preflow ends as a valid flow.

use std::collections::VecDeque;

use crate::cartographer::Capacity;

use super::residual::ResidualNetwork;

/// Max flow from `source` to `sink`. To bound the result, call with a
/// super-source from [`ResidualNetwork::add_supply_cap`].
pub(crate) fn preflow_push(net: &mut ResidualNetwork, source: usize, sink: usize) -> Capacity {
    let n = net.node_count();
    let mut height = vec![0usize; n];
    let mut excess: Vec<Capacity> = vec![0; n];
    let mut current = vec![0usize; n];
    let mut queued = vec![false; n];
    let mut active = VecDeque::new();

    height[source] = n;

    for i in 0..net.adj[source].len() {
        let arc = net.adj[source][i];
        let amount = net.residual[arc];
        if amount == 0 {
            continue;
        }
        let v = net.head[arc];
        net.push(arc, amount);
        excess[v] = excess[v].saturating_add(amount);
        if v != sink && v != source && !queued[v] {
            queued[v] = true;
            active.push_back(v);
        }
    }

    while let Some(u) = active.pop_front() {
        queued[u] = false;

        while excess[u] > 0 {
            if current[u] == net.adj[u].len() {
                // relabel
                let lowest = net.adj[u]
                    .iter()
                    .filter(|&&arc| net.residual[arc] > 0)
                    .map(|&arc| height[net.head[arc]])
                    .min();
                match lowest {
                    Some(h) => height[u] = h + 1,
                    None => break,
                }
                current[u] = 0;
                continue;
            }

            let arc = net.adj[u][current[u]];
            let v = net.head[arc];
            if net.residual[arc] > 0 && height[u] == height[v] + 1 {
                let delta = excess[u].min(net.residual[arc]);
                net.push(arc, delta);
                excess[u] -= delta;
                excess[v] = excess[v].saturating_add(delta);
                if v != source && v != sink && !queued[v] {
                    queued[v] = true;
                    active.push_back(v);
                }
            } else {
                current[u] += 1;
            }
        }
    }

    excess[sink]
}
