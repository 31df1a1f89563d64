//! Augmenting-path max flow: Edmonds-Karp and Dinic.
//!
//! Both take an optional `limit` and never augment past it; once the limit is
//! reached they stop without finishing the max-flow computation.

use std::collections::VecDeque;

use crate::cartographer::Capacity;

use super::residual::ResidualNetwork;

const UNREACHED: usize = usize::MAX;

fn remaining(limit: Option<Capacity>, total: Capacity) -> Capacity {
    limit.map_or(Capacity::MAX, |l| l.saturating_sub(total))
}

/// Shortest augmenting paths found by BFS
pub(crate) fn edmonds_karp(
    net: &mut ResidualNetwork,
    source: usize,
    sink: usize,
    limit: Option<Capacity>,
) -> Capacity {
    let n = net.node_count();
    let mut total: Capacity = 0;

    loop {
        let allowance = remaining(limit, total);
        if allowance == 0 {
            break;
        }

        let mut parent_arc = vec![UNREACHED; n];
        let mut queue = VecDeque::from([source]);
        let mut reached = false;

        'bfs: while let Some(u) = queue.pop_front() {
            for &arc in &net.adj[u] {
                let v = net.head[arc];
                if v == source || parent_arc[v] != UNREACHED || net.residual[arc] == 0 {
                    continue;
                }
                parent_arc[v] = arc;
                if v == sink {
                    reached = true;
                    break 'bfs;
                }
                queue.push_back(v);
            }
        }

        if !reached {
            break;
        }

        let mut path = Vec::new();
        let mut node = sink;
        while node != source {
            let arc = parent_arc[node];
            path.push(arc);
            node = net.tail[arc];
        }

        let bottleneck = path
            .iter()
            .map(|&arc| net.residual[arc])
            .min()
            .unwrap_or(0)
            .min(allowance);
        for &arc in &path {
            net.push(arc, bottleneck);
        }
        total += bottleneck;
    }

    total
}

/// Dinic's blocking flows. With `scaling`, only arcs with residual at least
/// `delta` are used, `delta` halving from the largest power of two not above
/// the biggest capacity.
pub(crate) fn dinic(
    net: &mut ResidualNetwork,
    source: usize,
    sink: usize,
    limit: Option<Capacity>,
    scaling: bool,
) -> Capacity {
    let n = net.node_count();
    let mut total: Capacity = 0;
    let mut level = vec![UNREACHED; n];
    let mut current = vec![0usize; n];

    let max_capacity = net.max_capacity();
    if max_capacity == 0 {
        return 0;
    }
    let mut delta: Capacity = if scaling {
        1 << (Capacity::BITS - 1 - max_capacity.leading_zeros())
    } else {
        1
    };

    while delta > 0 {
        loop {
            if remaining(limit, total) == 0 {
                return total;
            }
            if !build_levels(net, source, sink, delta, &mut level) {
                break;
            }
            current.fill(0);

            while let Some(path) = find_path(net, source, sink, delta, &level, &mut current) {
                let allowance = remaining(limit, total);
                let bottleneck = path
                    .iter()
                    .map(|&arc| net.residual[arc])
                    .min()
                    .unwrap_or(0)
                    .min(allowance);
                for &arc in &path {
                    net.push(arc, bottleneck);
                }
                total += bottleneck;
                if remaining(limit, total) == 0 {
                    return total;
                }
            }
        }
        delta /= 2;
    }

    total
}

/// BFS levels over arcs with residual >= delta. Returns whether the sink is reachable.
fn build_levels(net: &ResidualNetwork, source: usize, sink: usize, delta: Capacity, level: &mut [usize]) -> bool {
    level.fill(UNREACHED);
    level[source] = 0;
    let mut queue = VecDeque::from([source]);

    while let Some(u) = queue.pop_front() {
        for &arc in &net.adj[u] {
            let v = net.head[arc];
            if level[v] == UNREACHED && net.residual[arc] >= delta {
                level[v] = level[u] + 1;
                queue.push_back(v);
            }
        }
    }

    level[sink] != UNREACHED
}

/// Advance/retreat search for one path in the level graph
fn find_path(
    net: &ResidualNetwork,
    source: usize,
    sink: usize,
    delta: Capacity,
    level: &[usize],
    current: &mut [usize],
) -> Option<Vec<usize>> {
    let mut path: Vec<usize> = Vec::new();
    let mut u = source;

    loop {
        if u == sink {
            return Some(path);
        }

        let mut advanced = false;
        while current[u] < net.adj[u].len() {
            let arc = net.adj[u][current[u]];
            let v = net.head[arc];
            if net.residual[arc] >= delta && level[v] != UNREACHED && level[v] == level[u] + 1 {
                path.push(arc);
                u = v;
                advanced = true;
                break;
            }
            current[u] += 1;
        }

        if !advanced {
            // dead end: retreat and skip the arc that led here
            let arc = path.pop()?;
            u = net.tail[arc];
            current[u] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::Vertex;

    fn v(id: u32) -> Vertex {
        Vertex::Account(id)
    }

    fn classic() -> ResidualNetwork {
        ResidualNetwork::from_edges([
            (v(0), v(1), 16),
            (v(0), v(2), 13),
            (v(1), v(3), 12),
            (v(2), v(1), 4),
            (v(2), v(4), 14),
            (v(3), v(2), 9),
            (v(3), v(5), 20),
            (v(4), v(3), 7),
            (v(4), v(5), 4),
        ])
    }

    fn ends(net: &ResidualNetwork) -> (usize, usize) {
        (net.node(&v(0)).unwrap(), net.node(&v(5)).unwrap())
    }

    #[test]
    fn test_edmonds_karp_classic() {
        let mut net = classic();
        let (s, t) = ends(&net);
        assert_eq!(edmonds_karp(&mut net, s, t, None), 23);
    }

    #[test]
    fn test_dinic_classic() {
        let mut plain = classic();
        let (s, t) = ends(&plain);
        assert_eq!(dinic(&mut plain, s, t, None, false), 23);

        let mut scaled = classic();
        assert_eq!(dinic(&mut scaled, s, t, None, true), 23);
    }

    #[test]
    fn test_limit_is_exact() {
        for limit in [0, 1, 10, 22, 23, 24, 1000] {
            let mut ek = classic();
            let (s, t) = ends(&ek);
            assert_eq!(edmonds_karp(&mut ek, s, t, Some(limit)), limit.min(23));

            let mut dn = classic();
            assert_eq!(dinic(&mut dn, s, t, Some(limit), true), limit.min(23));
        }
    }

    #[test]
    fn test_disconnected() {
        let mut net = ResidualNetwork::from_edges([(v(0), v(1), 5), (v(2), v(3), 5)]);
        let (s, t) = (net.node(&v(0)).unwrap(), net.node(&v(3)).unwrap());
        assert_eq!(edmonds_karp(&mut net, s, t, None), 0);
        assert_eq!(dinic(&mut net, s, t, None, true), 0);
    }
}
