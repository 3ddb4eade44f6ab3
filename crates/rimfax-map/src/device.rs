//! Physical device model.
//!
//! A [`Device`] is an immutable description of the target hardware: qubit
//! count, directional coupling matrix, per-qubit and per-edge fidelities,
//! and precomputed all-pairs shortest paths over the symmetric closure of
//! the couplings.
//!
//! ## Performance
//!
//! Distance and next-hop tables are built once, by BFS from every qubit, at
//! construction. Path lookups are hot in the mappers' inner loops, so
//! [`Device::shortest_path`] is a table walk rather than a per-query BFS.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MapError, MapResult};

/// Default fidelity assumed wherever none is given.
pub const FIDELITY_1: f64 = 0.99;

/// Marks an unreachable entry in the distance table.
const UNREACHABLE: u32 = u32::MAX;

/// An immutable physical device.
#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    n: u32,
    /// `adj[c][t]`: a CNOT with control `c` and target `t` is realisable.
    adj: Vec<Vec<bool>>,
    sq_fid: Vec<f64>,
    tq_fid: Vec<Vec<f64>>,
    /// `dist[i][j]`: length of the shortest undirected path, or
    /// [`UNREACHABLE`].
    dist: Vec<Vec<u32>>,
    /// `next[dst][v]`: the neighbour of `v` on a shortest path towards
    /// `dst` (the predecessor of `v` in the BFS tree rooted at `dst`).
    next: Vec<Vec<u32>>,
}

impl Device {
    /// Number of physical qubits.
    #[inline]
    pub fn qubits(&self) -> u32 {
        self.n
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a CNOT with control `c` and target `t` is directly
    /// realisable (directional).
    #[inline]
    pub fn coupled(&self, c: u32, t: u32) -> bool {
        self.adj
            .get(c as usize)
            .is_some_and(|row| row.get(t as usize).copied().unwrap_or(false))
    }

    /// Whether `a` and `b` are adjacent in the symmetric closure.
    #[inline]
    pub fn connected(&self, a: u32, b: u32) -> bool {
        self.coupled(a, b) || self.coupled(b, a)
    }

    /// Single-qubit fidelity.
    pub fn qubit_fidelity(&self, q: u32) -> f64 {
        self.sq_fid[q as usize]
    }

    /// Two-qubit fidelity; meaningful only where [`coupled`](Self::coupled)
    /// holds.
    pub fn edge_fidelity(&self, c: u32, t: u32) -> f64 {
        self.tq_fid[c as usize][t as usize]
    }

    /// Shortest-path distance over the symmetric closure, `None` when the
    /// qubits lie in different connected components.
    pub fn distance(&self, a: u32, b: u32) -> Option<u32> {
        let d = self.dist[a as usize][b as usize];
        (d != UNREACHABLE).then_some(d)
    }

    /// The shortest path from `src` to `dst`, excluding the source and
    /// including the destination. Empty when `src == dst` or when no path
    /// exists. Successive pairs are adjacent in the symmetric closure.
    pub fn shortest_path(&self, src: u32, dst: u32) -> MapResult<Vec<u32>> {
        for q in [src, dst] {
            if q >= self.n {
                return Err(MapError::OutOfRangeQubit {
                    qubit: q,
                    qubits: self.n,
                });
            }
        }

        if src == dst || self.dist[src as usize][dst as usize] == UNREACHABLE {
            return Ok(vec![]);
        }

        let towards = &self.next[dst as usize];
        let mut path = Vec::with_capacity(self.dist[src as usize][dst as usize] as usize);
        let mut cur = src;
        while cur != dst {
            cur = towards[cur as usize];
            path.push(cur);
        }
        Ok(path)
    }

    /// Serialise to the JSON interchange format.
    pub fn to_json(&self) -> MapResult<String> {
        let mut couplings = Vec::new();
        for c in 0..self.n as usize {
            for t in 0..self.n as usize {
                if !self.adj[c][t] {
                    continue;
                }
                let directed = !self.adj[t][c];
                // Undirected edges appear once, lowest endpoint first.
                if !directed && t < c {
                    continue;
                }
                couplings.push(CouplingJson {
                    control: c as u32,
                    target: t as u32,
                    fidelity: self.tq_fid[c][t],
                    directed,
                });
            }
        }

        let model = DeviceJson {
            name: self.name.clone(),
            n: self.n,
            couplings,
            sq_fidelity: Some(self.sq_fid.clone()),
        };
        Ok(serde_json::to_string_pretty(&model)?)
    }

    /// Deserialise from the JSON interchange format.
    ///
    /// Unlike the builder, which reports and ignores bad entries, a JSON
    /// device is validated strictly: out-of-range qubits or fidelities are
    /// construction failures.
    pub fn from_json(json: &str) -> MapResult<Self> {
        let model: DeviceJson = serde_json::from_str(json)?;
        let mut builder = DeviceBuilder::new(model.name, model.n)?;

        for coupling in &model.couplings {
            for q in [coupling.control, coupling.target] {
                if q >= model.n {
                    return Err(MapError::InvalidDevice(format!(
                        "coupling qubit {q} out of range for n = {}",
                        model.n
                    )));
                }
            }
            if !(0.0..=1.0).contains(&coupling.fidelity) {
                return Err(MapError::InvalidDevice(format!(
                    "coupling fidelity {} outside [0, 1]",
                    coupling.fidelity
                )));
            }
            builder.add_weighted_edge(
                coupling.control,
                coupling.target,
                coupling.directed,
                coupling.fidelity,
            );
        }

        if let Some(sq) = model.sq_fidelity {
            if sq.len() != model.n as usize {
                return Err(MapError::InvalidDevice(format!(
                    "sq_fidelity has {} entries for n = {}",
                    sq.len(),
                    model.n
                )));
            }
            for (q, f) in sq.iter().enumerate() {
                if !(0.0..=1.0).contains(f) {
                    return Err(MapError::InvalidDevice(format!(
                        "single-qubit fidelity {f} outside [0, 1]"
                    )));
                }
                builder.set_qubit_fidelity(q as u32, *f);
            }
        }

        Ok(builder.build())
    }

    /// A device where every pair of qubits is coupled.
    pub fn fully_connected(n: u32) -> MapResult<Self> {
        let mut builder = DeviceBuilder::new(format!("fully connected {n}"), n)?;
        for i in 0..n {
            for j in (i + 1)..n {
                builder.add_edge(i, j);
            }
        }
        Ok(builder.build())
    }

    /// A linear chain `0 - 1 - … - (n-1)`.
    pub fn linear(n: u32) -> MapResult<Self> {
        let mut builder = DeviceBuilder::new(format!("{n} qubit chain"), n)?;
        for i in 0..n.saturating_sub(1) {
            builder.add_edge(i, i + 1);
        }
        Ok(builder.build())
    }

    /// A ring `0 - 1 - … - (n-1) - 0`.
    pub fn ring(n: u32) -> MapResult<Self> {
        let mut builder = DeviceBuilder::new(format!("{n} qubit ring"), n)?;
        for i in 0..n.saturating_sub(1) {
            builder.add_edge(i, i + 1);
        }
        if n > 2 {
            builder.add_edge(n - 1, 0);
        }
        Ok(builder.build())
    }
}

/// Builder for [`Device`].
///
/// Out-of-range edges and fidelities are reported and ignored; only a zero
/// qubit count fails construction.
#[derive(Debug)]
pub struct DeviceBuilder {
    name: String,
    n: u32,
    adj: Vec<Vec<bool>>,
    sq_fid: Vec<f64>,
    tq_fid: Vec<Vec<f64>>,
}

impl DeviceBuilder {
    /// Start building a device with `n` qubits.
    pub fn new(name: impl Into<String>, n: u32) -> MapResult<Self> {
        if n == 0 {
            return Err(MapError::InvalidDevice("qubit count must be positive".into()));
        }
        Ok(Self {
            name: name.into(),
            n,
            adj: vec![vec![false; n as usize]; n as usize],
            sq_fid: vec![FIDELITY_1; n as usize],
            tq_fid: vec![vec![FIDELITY_1; n as usize]; n as usize],
        })
    }

    /// Add an undirected coupling with the default fidelity.
    pub fn add_edge(&mut self, control: u32, target: u32) -> &mut Self {
        self.add_weighted_edge(control, target, false, FIDELITY_1)
    }

    /// Add a directed coupling with the default fidelity.
    pub fn add_directed_edge(&mut self, control: u32, target: u32) -> &mut Self {
        self.add_weighted_edge(control, target, true, FIDELITY_1)
    }

    /// Add a coupling with an explicit direction and fidelity.
    pub fn add_weighted_edge(
        &mut self,
        control: u32,
        target: u32,
        directed: bool,
        fidelity: f64,
    ) -> &mut Self {
        if control >= self.n || target >= self.n || control == target {
            warn!(control, target, "ignoring invalid edge");
            return self;
        }

        let (c, t) = (control as usize, target as usize);
        self.adj[c][t] = true;
        if !directed {
            self.adj[t][c] = true;
        }

        if (0.0..=1.0).contains(&fidelity) {
            self.tq_fid[c][t] = fidelity;
            if !directed {
                self.tq_fid[t][c] = fidelity;
            }
        } else {
            warn!(fidelity, "ignoring out-of-range edge fidelity");
        }
        self
    }

    /// Set the single-qubit fidelity of `qubit`.
    pub fn set_qubit_fidelity(&mut self, qubit: u32, fidelity: f64) -> &mut Self {
        if qubit >= self.n {
            warn!(qubit, "ignoring fidelity for out-of-range qubit");
        } else if !(0.0..=1.0).contains(&fidelity) {
            warn!(fidelity, "ignoring out-of-range qubit fidelity");
        } else {
            self.sq_fid[qubit as usize] = fidelity;
        }
        self
    }

    /// Finish construction, computing the shortest-path tables.
    pub fn build(self) -> Device {
        let n = self.n as usize;

        // Neighbour lists over the symmetric closure, ascending, so that
        // path reconstruction is deterministic for a given adjacency.
        let neighbours: Vec<Vec<u32>> = (0..n)
            .map(|v| {
                (0..n)
                    .filter(|&w| self.adj[v][w] || self.adj[w][v])
                    .map(|w| w as u32)
                    .collect()
            })
            .collect();

        let mut dist = vec![vec![UNREACHABLE; n]; n];
        let mut next = vec![vec![UNREACHABLE; n]; n];

        for src in 0..n {
            dist[src][src] = 0;
            let mut queue = std::collections::VecDeque::from([src as u32]);
            while let Some(v) = queue.pop_front() {
                for &w in &neighbours[v as usize] {
                    if dist[src][w as usize] == UNREACHABLE {
                        dist[src][w as usize] = dist[src][v as usize] + 1;
                        next[src][w as usize] = v;
                        queue.push_back(w);
                    }
                }
            }
        }

        Device {
            name: self.name,
            n: self.n,
            adj: self.adj,
            sq_fid: self.sq_fid,
            tq_fid: self.tq_fid,
            dist,
            next,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DeviceJson {
    name: String,
    n: u32,
    couplings: Vec<CouplingJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sq_fidelity: Option<Vec<f64>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CouplingJson {
    control: u32,
    target: u32,
    #[serde(default = "default_fidelity")]
    fidelity: f64,
    #[serde(default)]
    directed: bool,
}

fn default_fidelity() -> f64 {
    FIDELITY_1
}
