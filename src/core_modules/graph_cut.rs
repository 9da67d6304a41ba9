// THEORY:
// `FlowGraph` is the s/t min-cut solver GrabCut hands its energy to. Every pixel
// is a node; terminal edges carry the colour-model costs, neighbour edges carry
// the smoothness penalty, and the minimum cut separating the source
// (foreground) from the sink (background) is the minimum-energy labelling.
//
// The solver is Dinic's algorithm:
// 1.  **Level graph**: a BFS from the source over residual edges assigns each
//     node its distance. If the sink is unreachable the flow is maximal.
// 2.  **Blocking flow**: an iterative DFS pushes flow along strictly increasing
//     levels, with a per-node cursor so each edge is scanned at most once per
//     phase. Dead ends are pruned from the level graph.
// 3.  **Cut extraction**: after the last BFS, the nodes still reachable from the
//     source form the source side of the minimum cut.
//
// Edges are stored in pairs so `edge ^ 1` is always the reverse edge.
// Capacities are `f64`; anything below `FLOW_EPSILON` counts as saturated.

use std::collections::VecDeque;

const FLOW_EPSILON: f64 = 1e-9;
const UNREACHED: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Edge {
    to: usize,
    capacity: f64,
}

/// A directed flow network with a dedicated source and sink.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>,
    source: usize,
    sink: usize,
    level: Vec<usize>,
    cursor: Vec<usize>,
    /// Flow already accounted for by terminal-weight normalization.
    baseline_flow: f64,
    solved: bool,
}

impl FlowGraph {
    /// A graph with `node_count` inner nodes, numbered `0..node_count`.
    pub fn new(node_count: usize) -> Self {
        let total = node_count + 2;
        Self {
            edges: Vec::with_capacity(node_count * 12),
            adjacency: vec![Vec::new(); total],
            source: node_count,
            sink: node_count + 1,
            level: vec![UNREACHED; total],
            cursor: vec![0; total],
            baseline_flow: 0.0,
            solved: false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len() - 2
    }

    fn push_pair(&mut self, from: usize, to: usize, capacity: f64, reverse_capacity: f64) {
        let forward = self.edges.len();
        self.edges.push(Edge { to, capacity });
        self.edges.push(Edge {
            to: from,
            capacity: reverse_capacity,
        });
        self.adjacency[from].push(forward);
        self.adjacency[to].push(forward + 1);
        self.solved = false;
    }

    /// Connects `node` to both terminals. Only the difference between the two
    /// weights matters for the cut, so the common part is folded into the
    /// baseline flow and the edges stay non-negative even for negative costs.
    pub fn add_terminal_weights(&mut self, node: usize, source_weight: f64, sink_weight: f64) {
        let common = source_weight.min(sink_weight);
        self.baseline_flow += common;
        let to_source = source_weight - common;
        let to_sink = sink_weight - common;
        if to_source > 0.0 {
            self.push_pair(self.source, node, to_source, 0.0);
        }
        if to_sink > 0.0 {
            self.push_pair(node, self.sink, to_sink, 0.0);
        }
    }

    /// Undirected neighbour link with the same capacity both ways.
    pub fn add_edge(&mut self, a: usize, b: usize, weight: f64) {
        if weight > 0.0 {
            self.push_pair(a, b, weight, weight);
        }
    }

    fn build_levels(&mut self) -> bool {
        self.level.iter_mut().for_each(|l| *l = UNREACHED);
        self.level[self.source] = 0;
        let mut queue = VecDeque::from([self.source]);
        while let Some(node) = queue.pop_front() {
            for &e in &self.adjacency[node] {
                let edge = &self.edges[e];
                if edge.capacity > FLOW_EPSILON && self.level[edge.to] == UNREACHED {
                    self.level[edge.to] = self.level[node] + 1;
                    queue.push_back(edge.to);
                }
            }
        }
        self.level[self.sink] != UNREACHED
    }

    fn blocking_flow(&mut self) -> f64 {
        self.cursor.iter_mut().for_each(|c| *c = 0);
        let mut pushed = 0.0;
        let mut path: Vec<usize> = Vec::new();
        let mut node = self.source;

        loop {
            if node == self.sink {
                let bottleneck = path
                    .iter()
                    .map(|&e| self.edges[e].capacity)
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.edges[e].capacity -= bottleneck;
                    self.edges[e ^ 1].capacity += bottleneck;
                }
                pushed += bottleneck;
                path.clear();
                node = self.source;
                continue;
            }

            let mut advanced = false;
            while self.cursor[node] < self.adjacency[node].len() {
                let e = self.adjacency[node][self.cursor[node]];
                let edge = &self.edges[e];
                if edge.capacity > FLOW_EPSILON
                    && self.level[edge.to] != UNREACHED
                    && self.level[edge.to] == self.level[node] + 1
                {
                    path.push(e);
                    node = edge.to;
                    advanced = true;
                    break;
                }
                self.cursor[node] += 1;
            }

            if !advanced {
                if node == self.source {
                    return pushed;
                }
                // Dead end: prune it and step back.
                self.level[node] = UNREACHED;
                match path.pop() {
                    Some(e) => {
                        node = self.edges[e ^ 1].to;
                        self.cursor[node] += 1;
                    }
                    None => return pushed,
                }
            }
        }
    }

    /// Runs Dinic to completion and returns the maximum flow value, including
    /// the flow folded out of the terminal weights.
    pub fn max_flow(&mut self) -> f64 {
        let mut flow = self.baseline_flow;
        while self.build_levels() {
            flow += self.blocking_flow();
        }
        self.solved = true;
        flow
    }

    /// Whether `node` ends up on the source (foreground) side of the cut.
    /// Only meaningful after `max_flow`.
    pub fn in_source_segment(&self, node: usize) -> bool {
        self.solved && self.level[node] != UNREACHED
    }
}
