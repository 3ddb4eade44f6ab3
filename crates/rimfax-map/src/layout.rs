//! Initial layout: choosing which logical qubit starts at which physical
//! qubit, and rewriting the program accordingly.

use std::str::FromStr;

use petgraph::graphmap::UnGraphMap;
use rustc_hash::FxHashMap;
use tracing::debug;

use rimfax_qasm::{Gate, Program, QubitRef, Stmt};

use crate::device::Device;
use crate::error::{MapError, MapResult};

/// Initial-layout strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutStrategy {
    /// Identity on the declared qubits.
    Linear,
    /// Physical indices handed out in first-appearance order.
    Eager,
    /// Greedy placement along the interaction graph, weighted by fidelity.
    BestFit,
}

impl FromStr for LayoutStrategy {
    type Err = MapError;

    fn from_str(s: &str) -> MapResult<Self> {
        match s {
            "linear" => Ok(LayoutStrategy::Linear),
            "eager" => Ok(LayoutStrategy::Eager),
            "bestfit" => Ok(LayoutStrategy::BestFit),
            other => Err(MapError::UnsupportedLayout(other.to_string())),
        }
    }
}

/// An injective map from logical qubits, keyed by register name and offset,
/// to physical indices. Total on the qubits the program declares.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    map: FxHashMap<QubitRef, u32>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `logical -> physical`.
    pub fn assign(&mut self, logical: QubitRef, physical: u32) {
        self.map.insert(logical, physical);
    }

    /// Physical index assigned to `logical`, if any.
    pub fn get(&self, logical: &QubitRef) -> Option<u32> {
        self.map.get(logical).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// `(logical, physical)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&QubitRef, u32)> {
        self.map.iter().map(|(l, &p)| (l, p))
    }
}

/// Compute an initial layout with the chosen strategy.
///
/// Interaction weights consider `CX` applications only, so `bestfit`
/// expects an inlined program; the other strategies do not care.
pub fn compute_layout(
    strategy: LayoutStrategy,
    device: &Device,
    program: &Program,
) -> MapResult<Layout> {
    let declared = declared_qubits(program);
    let required = declared.len() as u32;
    if required > device.qubits() {
        return Err(MapError::InsufficientQubits {
            required,
            available: device.qubits(),
        });
    }

    let layout = match strategy {
        LayoutStrategy::Linear => linear_layout(&declared),
        LayoutStrategy::Eager => eager_layout(&declared, program),
        LayoutStrategy::BestFit => bestfit_layout(&declared, device, program),
    };
    debug!(strategy = ?strategy, qubits = required, "computed initial layout");
    Ok(layout)
}

/// Every declared qubit in declaration order.
fn declared_qubits(program: &Program) -> Vec<QubitRef> {
    let mut declared = Vec::new();
    for (name, size) in program.qregs() {
        for index in 0..size {
            declared.push(QubitRef::single(name, index));
        }
    }
    declared
}

fn linear_layout(declared: &[QubitRef]) -> Layout {
    let mut layout = Layout::new();
    for (physical, logical) in declared.iter().enumerate() {
        layout.assign(logical.clone(), physical as u32);
    }
    layout
}

fn eager_layout(declared: &[QubitRef], program: &Program) -> Layout {
    let mut layout = Layout::new();
    let mut next = 0u32;

    for stmt in &program.statements {
        for_each_ref(stmt, &mut |q| {
            if layout.get(q).is_none() {
                layout.assign(q.clone(), next);
                next += 1;
            }
        });
    }

    // Qubits the program never references keep declaration order among the
    // leftover physical indices.
    for logical in declared {
        if layout.get(logical).is_none() {
            layout.assign(logical.clone(), next);
            next += 1;
        }
    }
    layout
}

fn bestfit_layout(declared: &[QubitRef], device: &Device, program: &Program) -> Layout {
    let index_of: FxHashMap<&QubitRef, u32> = declared
        .iter()
        .enumerate()
        .map(|(i, q)| (q, i as u32))
        .collect();

    // Interaction graph: vertices are logical qubits, edge weights count the
    // two-qubit gates between them.
    let mut interactions: UnGraphMap<u32, u32> = UnGraphMap::new();
    for stmt in &program.statements {
        count_interactions(stmt, &index_of, &mut interactions);
    }

    let mut edges: Vec<(u32, u32, u32)> = interactions
        .all_edges()
        .map(|(a, b, &w)| (a.min(b), a.max(b), w))
        .collect();
    edges.sort_by(|x, y| y.2.cmp(&x.2).then((x.0, x.1).cmp(&(y.0, y.1))));

    let n = device.qubits();
    let mut placed: Vec<Option<u32>> = vec![None; declared.len()];
    let mut used = vec![false; n as usize];

    for (a, b, _) in edges {
        match (placed[a as usize], placed[b as usize]) {
            (Some(_), Some(_)) => {}
            (Some(p), None) => {
                if let Some(q) = best_free_neighbour(device, &used, p) {
                    placed[b as usize] = Some(q);
                    used[q as usize] = true;
                }
            }
            (None, Some(p)) => {
                if let Some(q) = best_free_neighbour(device, &used, p) {
                    placed[a as usize] = Some(q);
                    used[q as usize] = true;
                }
            }
            (None, None) => {
                if let Some((p, q)) = best_free_pair(device, &used) {
                    placed[a as usize] = Some(p);
                    placed[b as usize] = Some(q);
                    used[p as usize] = true;
                    used[q as usize] = true;
                }
            }
        }
    }

    // Greedily unplaced qubits go to the remaining physical indices in
    // ascending order.
    let mut free = (0..n).filter(|&p| !used[p as usize]);
    let mut layout = Layout::new();
    for (i, logical) in declared.iter().enumerate() {
        let physical = match placed[i] {
            Some(p) => p,
            None => free.next().expect("fit check guarantees enough qubits"),
        };
        layout.assign(logical.clone(), physical);
    }
    layout
}

/// Fidelity of the coupled pair `{a, b}`, whichever direction is realisable.
fn pair_fidelity(device: &Device, a: u32, b: u32) -> f64 {
    let mut fid: f64 = 0.0;
    if device.coupled(a, b) {
        fid = fid.max(device.edge_fidelity(a, b));
    }
    if device.coupled(b, a) {
        fid = fid.max(device.edge_fidelity(b, a));
    }
    fid
}

/// The free neighbour of `p` with the best coupling fidelity, lowest index
/// on ties.
fn best_free_neighbour(device: &Device, used: &[bool], p: u32) -> Option<u32> {
    let mut best: Option<(f64, u32)> = None;
    for q in 0..device.qubits() {
        if used[q as usize] || !device.connected(p, q) {
            continue;
        }
        let fid = pair_fidelity(device, p, q);
        if best.map_or(true, |(bf, _)| fid > bf) {
            best = Some((fid, q));
        }
    }
    best.map(|(_, q)| q)
}

/// The best free coupled pair, preferring pairs adjacent to qubits already
/// placed, then higher fidelity, then the lowest index pair.
fn best_free_pair(device: &Device, used: &[bool]) -> Option<(u32, u32)> {
    let any_placed = used.iter().any(|&u| u);
    let mut best: Option<(bool, f64, u32, u32)> = None;

    for p in 0..device.qubits() {
        for q in (p + 1)..device.qubits() {
            if used[p as usize] || used[q as usize] || !device.connected(p, q) {
                continue;
            }
            let near_placed = any_placed
                && (0..device.qubits()).any(|r| {
                    used[r as usize] && (device.connected(p, r) || device.connected(q, r))
                });
            let fid = pair_fidelity(device, p, q);
            let better = match best {
                None => true,
                Some((bn, bf, _, _)) => {
                    (near_placed, fid) > (bn, bf)
                }
            };
            if better {
                best = Some((near_placed, fid, p, q));
            }
        }
    }
    best.map(|(_, _, p, q)| (p, q))
}

fn count_interactions(
    stmt: &Stmt,
    index_of: &FxHashMap<&QubitRef, u32>,
    interactions: &mut UnGraphMap<u32, u32>,
) {
    match stmt {
        Stmt::Gate(Gate::Cnot { ctrl, tgt, .. }) => {
            if let (Some(&a), Some(&b)) = (index_of.get(ctrl), index_of.get(tgt)) {
                let weight = interactions.edge_weight(a, b).copied().unwrap_or(0);
                interactions.add_edge(a, b, weight + 1);
            }
        }
        Stmt::If { body, .. } => count_interactions(body, index_of, interactions),
        _ => {}
    }
}

/// Visit every qubit reference of a statement in source order.
fn for_each_ref(stmt: &Stmt, f: &mut impl FnMut(&QubitRef)) {
    match stmt {
        Stmt::Gate(gate) => {
            for q in gate.qubits() {
                f(q);
            }
        }
        Stmt::Measure { qubit, .. } | Stmt::Reset { qubit, .. } => f(qubit),
        Stmt::Barrier { qubits, .. } => {
            for q in qubits {
                f(q);
            }
        }
        Stmt::If { body, .. } => for_each_ref(body, f),
        _ => {}
    }
}

/// Visit every qubit reference of a statement mutably.
fn for_each_ref_mut(stmt: &mut Stmt, f: &mut impl FnMut(&mut QubitRef)) {
    match stmt {
        Stmt::Gate(gate) => {
            for q in gate.qubits_mut() {
                f(q);
            }
        }
        Stmt::Measure { qubit, .. } | Stmt::Reset { qubit, .. } => f(qubit),
        Stmt::Barrier { qubits, .. } => {
            for q in qubits {
                f(q);
            }
        }
        Stmt::If { body, .. } => for_each_ref_mut(body, f),
        _ => {}
    }
}

/// Rewrite the program so every laid-out reference names its physical slot
/// in the global register, and resize the quantum declaration to device
/// width.
///
/// The original `qreg` declarations are replaced by a single
/// `qreg <register>[n]`; classical registers and references outside the
/// layout are untouched.
pub fn apply_layout(
    layout: &Layout,
    device: &Device,
    program: &mut Program,
    register: &str,
) {
    for stmt in &mut program.statements {
        for_each_ref_mut(stmt, &mut |q| {
            if let Some(physical) = layout.get(q) {
                *q = QubitRef::single(register, physical);
            }
        });
    }

    let mut replaced = false;
    program.statements.retain_mut(|stmt| match stmt {
        Stmt::QregDecl { name, size, .. } => {
            if replaced {
                false
            } else {
                replaced = true;
                *name = register.to_string();
                *size = device.qubits();
                true
            }
        }
        _ => true,
    });
}
