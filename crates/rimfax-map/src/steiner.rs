//! Steiner-tree mapper for CNOT-rich programs.
//!
//! Collects maximal runs of consecutive CNOTs, encodes each run as a GF(2)
//! parity matrix, and resynthesises it over the device topology: one vertex
//! at a time, eliminate its column and then its row using only edges among
//! the not-yet-processed vertices, routing the eliminations along
//! approximate Steiner trees. Picking a non-cut pivot keeps the remaining
//! subgraph connected, so processed vertices are never touched again.
//!
//! The synthesis reproduces each run's parity matrix exactly, so unlike the
//! swap mapper no residual relocation exists and the returned permutation
//! is the identity.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use rimfax_qasm::{Gate, Position, Program, QubitRef, Stmt};

use crate::device::Device;
use crate::emit;
use crate::error::{MapError, MapResult};
use crate::permutation::Permutation;
use crate::swap::DEFAULT_REGISTER;

/// The Steiner-tree mapper.
pub struct SteinerMapper<'d> {
    device: &'d Device,
    register: String,
}

/// One collected CNOT, control then target, with its source position.
type RunGate = (u32, u32, Position);

impl<'d> SteinerMapper<'d> {
    /// Create a mapper over `device` using the default register name.
    pub fn new(device: &'d Device) -> Self {
        Self::with_register(device, DEFAULT_REGISTER)
    }

    /// Create a mapper rewriting references in `register`.
    pub fn with_register(device: &'d Device, register: impl Into<String>) -> Self {
        Self {
            device,
            register: register.into(),
        }
    }

    /// Map the program in place. The permutation is always the identity.
    pub fn run(self, program: &mut Program) -> MapResult<Permutation> {
        let statements = std::mem::take(&mut program.statements);
        let mut out = Vec::with_capacity(statements.len());
        let mut run: Vec<RunGate> = Vec::new();

        for stmt in statements {
            match stmt {
                Stmt::Gate(Gate::Cnot { ctrl, tgt, pos }) => {
                    match (self.operand(&ctrl)?, self.operand(&tgt)?) {
                        (Some(c), Some(t)) => run.push((c, t, pos)),
                        _ => {
                            warn!(
                                register = %ctrl.register,
                                "CNOT outside the global register passed through"
                            );
                            self.flush(&mut run, &mut out)?;
                            out.push(Stmt::Gate(Gate::Cnot { ctrl, tgt, pos }));
                        }
                    }
                }

                Stmt::GateDecl { .. } | Stmt::OpaqueDecl { .. } => {
                    self.flush(&mut run, &mut out)?;
                }

                // A guarded CNOT forms its own single-gate run with every
                // synthesised gate carrying the same guard.
                Stmt::If {
                    register,
                    value,
                    body,
                    pos,
                } => {
                    self.flush(&mut run, &mut out)?;
                    if let Stmt::Gate(Gate::Cnot { ctrl, tgt, pos: gpos }) = &*body {
                        if let (Some(c), Some(t)) = (self.operand(ctrl)?, self.operand(tgt)?) {
                            let mut expansion = Vec::new();
                            self.flush(&mut vec![(c, t, *gpos)], &mut expansion)?;
                            for stmt in expansion {
                                out.push(Stmt::If {
                                    register: register.clone(),
                                    value,
                                    body: Box::new(stmt),
                                    pos,
                                });
                            }
                            continue;
                        }
                    }
                    self.check_refs(&body)?;
                    out.push(Stmt::If {
                        register,
                        value,
                        body,
                        pos,
                    });
                }

                other => {
                    self.flush(&mut run, &mut out)?;
                    self.check_refs(&other)?;
                    out.push(other);
                }
            }
        }
        self.flush(&mut run, &mut out)?;

        program.statements = out;
        Ok(Permutation::identity(self.device.qubits()))
    }

    fn operand(&self, q: &QubitRef) -> MapResult<Option<u32>> {
        if q.register != self.register {
            return Ok(None);
        }
        match q.index {
            Some(index) if index >= self.device.qubits() => Err(MapError::OutOfRangeQubit {
                qubit: index,
                qubits: self.device.qubits(),
            }),
            other => Ok(other),
        }
    }

    fn check_refs(&self, stmt: &Stmt) -> MapResult<()> {
        match stmt {
            Stmt::Gate(gate) => {
                for q in gate.qubits() {
                    self.operand(q)?;
                }
            }
            Stmt::Measure { qubit, .. } | Stmt::Reset { qubit, .. } => {
                self.operand(qubit)?;
            }
            Stmt::Barrier { qubits, .. } => {
                for q in qubits {
                    self.operand(q)?;
                }
            }
            Stmt::If { body, .. } => self.check_refs(body)?,
            _ => {}
        }
        Ok(())
    }

    /// Splice the pending run back into the output, resynthesised when any
    /// of its gates is non-local.
    fn flush(&self, run: &mut Vec<RunGate>, out: &mut Vec<Stmt>) -> MapResult<()> {
        if run.is_empty() {
            return Ok(());
        }
        let gates = std::mem::take(run);

        if gates.iter().all(|&(c, t, _)| self.device.coupled(c, t)) {
            for (c, t, pos) in gates {
                out.push(Stmt::Gate(emit::cnot(&self.register, c, t, pos)));
            }
            return Ok(());
        }

        debug!(len = gates.len(), "resynthesising CNOT run");
        for gate in self.synthesise(&gates)? {
            out.push(Stmt::Gate(gate));
        }
        Ok(())
    }

    /// Resynthesise a run over the device topology.
    fn synthesise(&self, gates: &[RunGate]) -> MapResult<Vec<Gate>> {
        let n = self.device.qubits() as usize;
        let pos = gates[0].2;

        // The run as a parity matrix: CNOT(c, t) adds row c into row t.
        let mut matrix = BitMatrix::identity(n);
        for &(c, t, _) in gates {
            debug_assert_ne!(c, t);
            matrix.row_add(c as usize, t as usize);
        }

        let component = components(self.device);
        for r in 0..n {
            for c in 0..n {
                if matrix.rows[r][c] && component[r] != component[c] {
                    return Err(MapError::DisconnectedQubits {
                        qubit1: c as u32,
                        qubit2: r as u32,
                    });
                }
            }
        }

        let mut reduction = Reduction {
            device: self.device,
            matrix,
            ops: Vec::new(),
        };

        let mut comps: Vec<usize> = component.clone();
        comps.sort_unstable();
        comps.dedup();
        for id in comps {
            let vertices: Vec<u32> = (0..n)
                .filter(|&v| component[v] == id)
                .map(|v| v as u32)
                .collect();
            reduction.row_col(&vertices)?;
        }

        // The recorded operations reduce the matrix to the identity; the
        // circuit computing it is their reverse.
        let mut out = Vec::new();
        for &(src, tgt) in reduction.ops.iter().rev() {
            out.extend(emit::adjacent_cnot(self.device, &self.register, src, tgt, pos));
        }
        Ok(out)
    }
}

/// Map `program` onto `device` with the Steiner mapper.
pub fn steiner_mapping(device: &Device, program: &mut Program) -> MapResult<Permutation> {
    SteinerMapper::new(device).run(program)
}

/// Connected-component id per qubit over the symmetric closure.
fn components(device: &Device) -> Vec<usize> {
    let n = device.qubits() as usize;
    let mut component = vec![usize::MAX; n];
    let mut next_id = 0;

    for start in 0..n {
        if component[start] != usize::MAX {
            continue;
        }
        component[start] = next_id;
        let mut queue = std::collections::VecDeque::from([start as u32]);
        while let Some(v) = queue.pop_front() {
            for w in 0..n as u32 {
                if component[w as usize] == usize::MAX && device.connected(v, w) {
                    component[w as usize] = next_id;
                    queue.push_back(w);
                }
            }
        }
        next_id += 1;
    }
    component
}

/// A dense GF(2) matrix.
struct BitMatrix {
    rows: Vec<Vec<bool>>,
}

impl BitMatrix {
    fn identity(n: usize) -> Self {
        let mut rows = vec![vec![false; n]; n];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = true;
        }
        Self { rows }
    }

    /// `row[tgt] ^= row[src]`.
    fn row_add(&mut self, src: usize, tgt: usize) {
        let src_row = self.rows[src].clone();
        for (t, s) in self.rows[tgt].iter_mut().zip(src_row) {
            *t ^= s;
        }
    }
}

/// State of one reduction: the matrix, the device and the recorded row
/// operations `(src, tgt)`, each on an adjacent pair.
struct Reduction<'d> {
    device: &'d Device,
    matrix: BitMatrix,
    ops: Vec<(u32, u32)>,
}

impl Reduction<'_> {
    fn row_add(&mut self, src: u32, tgt: u32) {
        self.matrix.row_add(src as usize, tgt as usize);
        self.ops.push((src, tgt));
    }

    /// Eliminate every vertex of one connected component.
    fn row_col(&mut self, vertices: &[u32]) -> MapResult<()> {
        let mut rem: Vec<u32> = vertices.to_vec();

        while rem.len() > 1 {
            let pivot = self.pick_non_cut(&rem);
            self.eliminate_column(pivot, &rem)?;
            self.eliminate_row(pivot, &rem)?;
            rem.retain(|&v| v != pivot);
        }
        Ok(())
    }

    /// The smallest vertex whose removal keeps the remaining subgraph
    /// connected. Every connected graph has one.
    fn pick_non_cut(&self, rem: &[u32]) -> u32 {
        *rem.iter()
            .find(|&&v| {
                let rest: Vec<u32> = rem.iter().copied().filter(|&w| w != v).collect();
                self.is_connected(&rest)
            })
            .expect("a connected graph always has a non-cut vertex")
    }

    fn is_connected(&self, vertices: &[u32]) -> bool {
        let Some(&start) = vertices.first() else {
            return true;
        };
        let mut seen = vec![start];
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(v) = queue.pop_front() {
            for &w in vertices {
                if !seen.contains(&w) && self.device.connected(v, w) {
                    seen.push(w);
                    queue.push_back(w);
                }
            }
        }
        seen.len() == vertices.len()
    }

    /// Make column `pivot` the unit vector, using only tree edges within
    /// the remaining subgraph.
    fn eliminate_column(&mut self, pivot: u32, rem: &[u32]) -> MapResult<()> {
        let terminals: Vec<u32> = rem
            .iter()
            .copied()
            .filter(|&r| self.matrix.rows[r as usize][pivot as usize])
            .collect();
        if terminals == [pivot] {
            return Ok(());
        }

        let tree = SteinerTree::grow(self.device, pivot, &terminals, rem)?;
        let col = pivot as usize;

        // Pull a 1 up to the root if it has none.
        if !self.matrix.rows[col][col] {
            for &(p, ch) in tree.preorder.iter().rev() {
                if !self.matrix.rows[p as usize][col] && self.matrix.rows[ch as usize][col] {
                    self.row_add(ch, p);
                }
            }
        }
        // Fill: every tree node gets a 1, parents first.
        for &(p, ch) in &tree.preorder {
            if !self.matrix.rows[ch as usize][col] {
                self.row_add(p, ch);
            }
        }
        // Eliminate: zero every non-root node, leaves first.
        for &(p, ch) in tree.preorder.iter().rev() {
            self.row_add(p, ch);
        }
        Ok(())
    }

    /// Make row `pivot` the unit vector without disturbing any other row.
    fn eliminate_row(&mut self, pivot: u32, rem: &[u32]) -> MapResult<()> {
        let n = self.matrix.rows.len();
        let mut target = self.matrix.rows[pivot as usize].clone();
        target[pivot as usize] = !target[pivot as usize];
        if target.iter().all(|&b| !b) {
            return Ok(());
        }

        // The set S of remaining rows whose sum is row_pivot + e_pivot.
        // It exists and is unique: the remaining rows with a zero in the
        // pivot column span exactly the vectors with a zero there.
        let members = solve_row_sum(&self.matrix, rem, pivot, &target)
            .expect("rows of an invertible parity matrix span the row space");

        let terminals: Vec<u32> = members
            .iter()
            .copied()
            .chain(std::iter::once(pivot))
            .collect();
        let tree = SteinerTree::grow(self.device, pivot, &terminals, rem)?;

        // Accumulate the rows of S into the pivot row. Each pass adds the
        // rows of every node of the touched subtree, and the cleanup pass
        // restores the non-root nodes; Steiner nodes picked up along the
        // way join the excess set and are cancelled by later passes, which
        // reach strictly shallower tree nodes each time.
        let mut excess = vec![false; n];
        for &m in &members {
            excess[m as usize] = true;
        }

        while excess.iter().any(|&b| b) {
            let mut keep = excess.clone();
            keep[pivot as usize] = true;
            for v in 0..n {
                if !excess[v] {
                    continue;
                }
                let mut cur = v as u32;
                while let Some(&p) = tree.parent.get(&cur) {
                    keep[p as usize] = true;
                    cur = p;
                }
            }

            let sub_edges: Vec<(u32, u32)> = tree
                .preorder
                .iter()
                .copied()
                .filter(|&(_, ch)| keep[ch as usize])
                .collect();

            for &(p, ch) in sub_edges.iter().rev() {
                self.row_add(ch, p);
            }
            for &(p, ch) in &sub_edges {
                if p != pivot {
                    self.row_add(ch, p);
                }
            }

            for v in 0..n {
                if v != pivot as usize && keep[v] {
                    excess[v] = !excess[v];
                }
            }
        }
        Ok(())
    }
}

/// Solve `sum of rows in S == target` over the rows `rem \ {pivot}`.
fn solve_row_sum(
    matrix: &BitMatrix,
    rem: &[u32],
    pivot: u32,
    target: &[bool],
) -> Option<Vec<u32>> {
    let n = matrix.rows.len();
    let rows: Vec<u32> = rem.iter().copied().filter(|&r| r != pivot).collect();

    // Each work row carries the set of original rows it is the sum of.
    let mut work: Vec<(Vec<bool>, Vec<bool>)> = rows
        .iter()
        .map(|&r| {
            let mut members = vec![false; n];
            members[r as usize] = true;
            (matrix.rows[r as usize].clone(), members)
        })
        .collect();

    let mut pivot_of_col: FxHashMap<u32, usize> = FxHashMap::default();
    let mut used = vec![false; work.len()];
    for &c in rem {
        let col = c as usize;
        let Some(i) = (0..work.len()).find(|&i| !used[i] && work[i].0[col]) else {
            continue;
        };
        used[i] = true;
        pivot_of_col.insert(c, i);
        for j in 0..work.len() {
            if j != i && work[j].0[col] {
                let (row_i, members_i) = work[i].clone();
                xor_into(&mut work[j].0, &row_i);
                xor_into(&mut work[j].1, &members_i);
            }
        }
    }

    let mut residual = target.to_vec();
    let mut members = vec![false; n];
    for &c in rem {
        if residual[c as usize] {
            let &i = pivot_of_col.get(&c)?;
            xor_into(&mut residual, &work[i].0);
            xor_into(&mut members, &work[i].1);
        }
    }
    if residual.iter().any(|&b| b) {
        return None;
    }

    Some(
        (0..n as u32)
            .filter(|&r| members[r as usize])
            .collect(),
    )
}

fn xor_into(dst: &mut [bool], src: &[bool]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

/// An approximate Steiner tree, grown by repeatedly joining the nearest
/// outstanding terminal along a shortest path within the remaining
/// subgraph.
struct SteinerTree {
    parent: FxHashMap<u32, u32>,
    /// Edges `(parent, child)`, parents always before their descendants.
    preorder: Vec<(u32, u32)>,
}

impl SteinerTree {
    fn grow(device: &Device, root: u32, terminals: &[u32], rem: &[u32]) -> MapResult<Self> {
        let mut parent: FxHashMap<u32, u32> = FxHashMap::default();
        let mut in_tree = vec![root];
        let mut pending: Vec<u32> = terminals.iter().copied().filter(|&t| t != root).collect();
        pending.sort_unstable();

        while !pending.is_empty() {
            // Multi-source BFS from the current tree within the remaining
            // subgraph, stopping at the nearest outstanding terminal.
            let mut prev: FxHashMap<u32, u32> = FxHashMap::default();
            let mut queue: std::collections::VecDeque<u32> = in_tree.iter().copied().collect();
            let mut seen: Vec<u32> = in_tree.clone();
            let mut found = None;

            'search: while let Some(v) = queue.pop_front() {
                for &w in rem {
                    if seen.contains(&w) || !device.connected(v, w) {
                        continue;
                    }
                    seen.push(w);
                    prev.insert(w, v);
                    if pending.contains(&w) {
                        found = Some(w);
                        break 'search;
                    }
                    queue.push_back(w);
                }
            }

            let Some(terminal) = found else {
                return Err(MapError::DisconnectedQubits {
                    qubit1: root,
                    qubit2: pending[0],
                });
            };

            // Walk back to the tree, attaching the path.
            let mut path = vec![terminal];
            let mut cur = terminal;
            while let Some(&p) = prev.get(&cur) {
                path.push(p);
                cur = p;
                if in_tree.contains(&cur) {
                    break;
                }
            }
            path.reverse();
            for pair in path.windows(2) {
                parent.insert(pair[1], pair[0]);
                in_tree.push(pair[1]);
            }
            // The path may have run through other outstanding terminals.
            pending.retain(|&t| !in_tree.contains(&t));
        }

        // Pre-order edge list via BFS from the root, children ascending.
        let mut children: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
        for (&ch, &p) in &parent {
            children.entry(p).or_default().push(ch);
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }

        let mut preorder = Vec::new();
        let mut queue = std::collections::VecDeque::from([root]);
        while let Some(v) = queue.pop_front() {
            for &ch in children.get(&v).map(Vec::as_slice).unwrap_or(&[]) {
                preorder.push((v, ch));
                queue.push_back(ch);
            }
        }

        Ok(Self { parent, preorder })
    }
}
