//! Partial-order alignment backend for edge consensus.
//!
//! The marker graph treats multiple sequence alignment as a replaceable
//! dependency behind [`MsaEngine`]: sequences go in one at a time, rows of
//! the alignment come out, in insertion order. [`PoaEngine`] is the default
//! implementation: a partial-order graph aligned against with
//! Needleman-Wunsch over the DAG, with substituted bases merged into
//! aligned-node groups that share an alignment column.

use crate::core::reads::Base;
use crate::Result;
use anyhow::{bail, ensure};

/// Factory for alignment engines, mirroring the create-engine surface of
/// the external partial-order aligners.
pub trait MsaEngineFactory: Send + Sync {
    fn create_engine(&self, match_score: i8, mismatch_score: i8, gap_score: i8)
        -> Box<dyn MsaEngine>;
}

/// One multiple-sequence-alignment computation. Sequences are added in the
/// order chosen by the caller; `generate_msa` returns one row per added
/// sequence, in that order, all of equal length, with `-` for gaps.
pub trait MsaEngine: Send {
    fn clear(&mut self);
    fn add_sequence(&mut self, sequence: &[Base]) -> Result<()>;
    fn generate_msa(&self, msa: &mut Vec<String>) -> Result<()>;
}

pub struct PoaEngineFactory;

impl MsaEngineFactory for PoaEngineFactory {
    fn create_engine(
        &self,
        match_score: i8,
        mismatch_score: i8,
        gap_score: i8,
    ) -> Box<dyn MsaEngine> {
        Box::new(PoaEngine::new(match_score, mismatch_score, gap_score))
    }
}

#[derive(Debug, Clone)]
struct Node {
    base: u8,
    successors: Vec<usize>,
    predecessors: Vec<usize>,
    /// Nodes holding substituted bases at the same alignment column. The
    /// group is kept a clique; no edges run inside a group.
    aligned: Vec<usize>,
}

/// One step of a sequence-to-graph alignment: a graph node, a sequence
/// position, or both.
type AlignmentStep = (Option<usize>, Option<usize>);

pub struct PoaEngine {
    match_score: i32,
    mismatch_score: i32,
    gap_score: i32,
    nodes: Vec<Node>,
    /// Node path of each added sequence.
    paths: Vec<Vec<usize>>,
}

impl PoaEngine {
    pub fn new(match_score: i8, mismatch_score: i8, gap_score: i8) -> Self {
        PoaEngine {
            match_score: i32::from(match_score),
            mismatch_score: i32::from(mismatch_score),
            gap_score: i32::from(gap_score),
            nodes: Vec::new(),
            paths: Vec::new(),
        }
    }

    fn new_node(&mut self, base: u8) -> usize {
        self.nodes.push(Node {
            base,
            successors: Vec::new(),
            predecessors: Vec::new(),
            aligned: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if !self.nodes[from].successors.contains(&to) {
            self.nodes[from].successors.push(to);
            self.nodes[to].predecessors.push(from);
        }
    }

    /// Topological order of the nodes, treating each aligned group as a
    /// unit: a group is emitted once the predecessors of all of its members
    /// are emitted, and its members are emitted consecutively. This is the
    /// order that makes column assignment well defined.
    fn topological_order(&self) -> Result<Vec<usize>> {
        let n = self.nodes.len();
        // Group representative: smallest node index of the aligned clique.
        let representative: Vec<usize> = (0..n)
            .map(|v| {
                self.nodes[v]
                    .aligned
                    .iter()
                    .copied()
                    .chain(std::iter::once(v))
                    .min()
                    .unwrap()
            })
            .collect();

        let mut group_in_degree = vec![0usize; n];
        for (v, node) in self.nodes.iter().enumerate() {
            for &p in &node.predecessors {
                debug_assert_ne!(representative[p], representative[v]);
                let _ = p;
                group_in_degree[representative[v]] += 1;
            }
        }

        let mut ready: Vec<usize> = (0..n)
            .filter(|&v| representative[v] == v && group_in_degree[v] == 0)
            .collect();
        ready.reverse(); // pop from the back; keeps small indices first
        let mut order = Vec::with_capacity(n);
        while let Some(group) = ready.pop() {
            let members: Vec<usize> = std::iter::once(group)
                .chain(self.nodes[group].aligned.iter().copied())
                .collect();
            for &member in &members {
                order.push(member);
            }
            for &member in &members {
                for &s in &self.nodes[member].successors {
                    let successor_group = representative[s];
                    group_in_degree[successor_group] -= 1;
                    if group_in_degree[successor_group] == 0 {
                        ready.push(successor_group);
                    }
                }
            }
        }
        ensure!(order.len() == n, "partial order graph contains a cycle");
        Ok(order)
    }

    /// Global alignment of `sequence` against the whole graph.
    fn align(&self, sequence: &[Base]) -> Result<Vec<AlignmentStep>> {
        #[derive(Copy, Clone, PartialEq)]
        enum Move {
            /// Consume a node and a character; predecessor node or start.
            Diagonal(Option<usize>),
            /// Consume a node only.
            Up(Option<usize>),
            /// Consume a character only.
            Left,
            None,
        }

        let order = self.topological_order()?;
        let m = sequence.len();
        let n = self.nodes.len();
        let minus_infinity = i32::MIN / 2;

        // Virtual start row: aligning j characters before entering the graph.
        let start_row: Vec<i32> = (0..=m as i32).map(|j| j * self.gap_score).collect();
        let mut score = vec![vec![minus_infinity; m + 1]; n];
        let mut back = vec![vec![Move::None; m + 1]; n];

        for &v in &order {
            let node_base = self.nodes[v].base;
            // Iterate real predecessors, or the virtual start for roots.
            let predecessors: Vec<Option<usize>> = if self.nodes[v].predecessors.is_empty() {
                vec![None]
            } else {
                self.nodes[v].predecessors.iter().map(|&p| Some(p)).collect()
            };
            for j in 0..=m {
                let mut best = minus_infinity;
                let mut best_move = Move::None;
                for &p in &predecessors {
                    let previous_row: &[i32] = match p {
                        Some(p) => &score[p],
                        None => &start_row,
                    };
                    if j > 0 {
                        let substitution = if node_base == sequence[j - 1].value() {
                            self.match_score
                        } else {
                            self.mismatch_score
                        };
                        let diagonal = previous_row[j - 1] + substitution;
                        if diagonal > best {
                            best = diagonal;
                            best_move = Move::Diagonal(p);
                        }
                    }
                    let up = previous_row[j] + self.gap_score;
                    if up > best {
                        best = up;
                        best_move = Move::Up(p);
                    }
                }
                if j > 0 {
                    let left = score[v][j - 1] + self.gap_score;
                    if left > best {
                        best = left;
                        best_move = Move::Left;
                    }
                }
                score[v][j] = best;
                back[v][j] = best_move;
            }
        }

        // The alignment must end at a node with no successors.
        let mut end: Option<usize> = None;
        for &v in &order {
            if self.nodes[v].successors.is_empty()
                && end.map_or(true, |best| score[v][m] > score[best][m])
            {
                end = Some(v);
            }
        }
        let Some(end) = end else {
            bail!("partial order graph has no sink node");
        };

        // Trace back to the virtual start.
        let mut steps: Vec<AlignmentStep> = Vec::new();
        let mut v = Some(end);
        let mut j = m;
        while let Some(current) = v {
            match back[current][j] {
                Move::Diagonal(p) => {
                    steps.push((Some(current), Some(j - 1)));
                    j -= 1;
                    v = p;
                }
                Move::Up(p) => {
                    steps.push((Some(current), None));
                    v = p;
                }
                Move::Left => {
                    steps.push((None, Some(j - 1)));
                    j -= 1;
                }
                Move::None => bail!("alignment traceback lost its way"),
            }
        }
        while j > 0 {
            steps.push((None, Some(j - 1)));
            j -= 1;
        }
        steps.reverse();
        Ok(steps)
    }

    /// Thread an aligned sequence into the graph, reusing matching nodes,
    /// joining substituted bases into aligned groups, and creating new nodes
    /// for insertions.
    fn add_alignment(&mut self, steps: &[AlignmentStep], sequence: &[Base]) {
        let mut path: Vec<usize> = Vec::with_capacity(sequence.len());
        let mut previous: Option<usize> = None;
        for &(node, position) in steps {
            let Some(position) = position else {
                continue; // gap in the sequence; no node consumed
            };
            let base = sequence[position].value();
            let current = match node {
                Some(v) if self.nodes[v].base == base => v,
                Some(v) => {
                    // A substitution: reuse an aligned node with this base,
                    // or grow the aligned group.
                    match self.nodes[v].aligned.iter().copied().find(|&a| self.nodes[a].base == base)
                    {
                        Some(a) => a,
                        None => {
                            let new = self.new_node(base);
                            let mut group: Vec<usize> = self.nodes[v].aligned.clone();
                            group.push(v);
                            for &member in &group {
                                self.nodes[member].aligned.push(new);
                                self.nodes[new].aligned.push(member);
                            }
                            new
                        }
                    }
                }
                None => self.new_node(base),
            };
            if let Some(previous) = previous {
                self.add_edge(previous, current);
            }
            path.push(current);
            previous = Some(current);
        }
        self.paths.push(path);
    }
}

impl MsaEngine for PoaEngine {
    fn clear(&mut self) {
        self.nodes.clear();
        self.paths.clear();
    }

    fn add_sequence(&mut self, sequence: &[Base]) -> Result<()> {
        ensure!(!sequence.is_empty(), "cannot align an empty sequence");
        if self.nodes.is_empty() {
            let mut path = Vec::with_capacity(sequence.len());
            let mut previous: Option<usize> = None;
            for &base in sequence {
                let node = self.new_node(base.value());
                if let Some(previous) = previous {
                    self.add_edge(previous, node);
                }
                path.push(node);
                previous = Some(node);
            }
            self.paths.push(path);
            return Ok(());
        }
        let steps = self.align(sequence)?;
        self.add_alignment(&steps, sequence);
        Ok(())
    }

    fn generate_msa(&self, msa: &mut Vec<String>) -> Result<()> {
        msa.clear();
        if self.nodes.is_empty() {
            return Ok(());
        }
        let order = self.topological_order()?;

        // Assign a column to each aligned group: one past the rightmost
        // column of any predecessor of any group member.
        let unassigned = usize::MAX;
        let mut column = vec![unassigned; self.nodes.len()];
        let mut width = 0usize;
        for &v in &order {
            if column[v] != unassigned {
                continue;
            }
            let mut c = 0usize;
            let members: Vec<usize> = std::iter::once(v)
                .chain(self.nodes[v].aligned.iter().copied())
                .collect();
            for &member in &members {
                for &p in &self.nodes[member].predecessors {
                    debug_assert_ne!(column[p], unassigned);
                    c = c.max(column[p] + 1);
                }
            }
            for &member in &members {
                column[member] = c;
            }
            width = width.max(c + 1);
        }

        for path in &self.paths {
            let mut row = vec![b'-'; width];
            for &node in path {
                row[column[node]] = Base::from_value(self.nodes[node].base).to_char() as u8;
            }
            msa.push(String::from_utf8(row).expect("alignment rows are ascii"));
        }
        Ok(())
    }
}
