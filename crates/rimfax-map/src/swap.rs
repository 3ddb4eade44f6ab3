//! Swap-inserting mapper.
//!
//! Walks the program in order and rewrites each non-local CNOT by
//! prepending a chain of SWAPs along a shortest path, keeping track of the
//! resulting qubit permutation rather than swapping back after each gate.
//! Each SWAP is three CNOTs; any CNOT whose direction the device does not
//! support is replaced by its Hadamard-sandwich equivalent, with the
//! Hadamards emitted in the source gate set as `U(pi/2, 0, pi)`.
//!
//! Precondition: the program is inlined and the layout has been applied, so
//! every qubit reference in the configured global register carries a
//! physical index.

use tracing::{debug, warn};

use rimfax_qasm::{Gate, Position, Program, QubitRef, Stmt};

use crate::device::Device;
use crate::emit;
use crate::error::{MapError, MapResult};
use crate::permutation::Permutation;

/// Default name of the global register the mapper rewrites.
pub const DEFAULT_REGISTER: &str = "q";

/// The swap-inserting mapper.
pub struct SwapMapper<'d> {
    device: &'d Device,
    register: String,
    permutation: Permutation,
}

impl<'d> SwapMapper<'d> {
    /// Create a mapper over `device` using the default register name.
    pub fn new(device: &'d Device) -> Self {
        Self::with_register(device, DEFAULT_REGISTER)
    }

    /// Create a mapper rewriting references in `register`.
    pub fn with_register(device: &'d Device, register: impl Into<String>) -> Self {
        Self {
            device,
            register: register.into(),
            permutation: Permutation::identity(device.qubits()),
        }
    }

    /// Map the program in place, returning the final permutation.
    pub fn run(mut self, program: &mut Program) -> MapResult<Permutation> {
        let statements = std::mem::take(&mut program.statements);
        let mut out = Vec::with_capacity(statements.len());

        for stmt in statements {
            self.rewrite(stmt, &mut out)?;
        }

        program.statements = out;
        Ok(self.permutation)
    }

    fn rewrite(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) -> MapResult<()> {
        match stmt {
            // Declaration residue from before inlining has no meaning after
            // mapping; elide it.
            Stmt::GateDecl { .. } | Stmt::OpaqueDecl { .. } => {}

            Stmt::Gate(mut gate) => {
                self.permute_gate(&mut gate)?;
                match gate {
                    Gate::Cnot { ctrl, tgt, pos } => {
                        for gate in self.expand_cnot(&ctrl, &tgt, pos)? {
                            out.push(Stmt::Gate(gate));
                        }
                    }
                    other => out.push(Stmt::Gate(other)),
                }
            }

            Stmt::Measure {
                mut qubit,
                bit,
                pos,
            } => {
                self.permute_ref(&mut qubit)?;
                out.push(Stmt::Measure { qubit, bit, pos });
            }

            Stmt::Reset { mut qubit, pos } => {
                self.permute_ref(&mut qubit)?;
                out.push(Stmt::Reset { qubit, pos });
            }

            Stmt::Barrier { mut qubits, pos } => {
                for q in &mut qubits {
                    self.permute_ref(q)?;
                }
                out.push(Stmt::Barrier { qubits, pos });
            }

            // A guarded statement is traversed like any other: the body sees
            // the same permutation the unconditional path would see, and a
            // non-local CNOT expands to a chain with every gate guarded by
            // the same condition.
            Stmt::If {
                register,
                value,
                body,
                pos,
            } => {
                let mut inner = Vec::new();
                self.rewrite(*body, &mut inner)?;
                for stmt in inner {
                    out.push(Stmt::If {
                        register: register.clone(),
                        value,
                        body: Box::new(stmt),
                        pos,
                    });
                }
            }

            other => out.push(other),
        }
        Ok(())
    }

    /// Rewrite each operand of `gate` through the running permutation.
    fn permute_gate(&self, gate: &mut Gate) -> MapResult<()> {
        for q in gate.qubits_mut() {
            self.permute_ref(q)?;
        }
        Ok(())
    }

    /// Rewrite one reference through the running permutation. References
    /// outside the configured register pass through untouched.
    fn permute_ref(&self, q: &mut QubitRef) -> MapResult<()> {
        if q.register != self.register {
            return Ok(());
        }
        let Some(index) = q.index else {
            return Ok(());
        };
        if index >= self.device.qubits() {
            return Err(MapError::OutOfRangeQubit {
                qubit: index,
                qubits: self.device.qubits(),
            });
        }
        q.index = Some(self.permutation.get(index));
        Ok(())
    }

    /// Replace a CNOT on (already permuted) physical slots with a local
    /// sequence, updating the permutation for every SWAP emitted.
    fn expand_cnot(&mut self, ctrl: &QubitRef, tgt: &QubitRef, pos: Position) -> MapResult<Vec<Gate>> {
        let (Some(c), Some(t)) = (operand(ctrl, &self.register), operand(tgt, &self.register))
        else {
            // A CNOT outside the global register cannot be routed; the
            // caller did not inline/lay out the program as required.
            warn!(register = %ctrl.register, "CNOT outside the global register passed through");
            return Ok(vec![Gate::Cnot {
                ctrl: ctrl.clone(),
                tgt: tgt.clone(),
                pos,
            }]);
        };

        let path = self.device.shortest_path(c, t)?;
        if path.is_empty() {
            return Err(MapError::DisconnectedQubits {
                qubit1: c,
                qubit2: t,
            });
        }

        let mut out = Vec::new();
        let mut i = c;
        for j in path {
            if j == t {
                out.extend(emit::adjacent_cnot(self.device, &self.register, i, j, pos));
                break;
            }
            if j != i {
                // Swap the contents of slots i and j. The outer CNOTs run
                // along a supported direction; the middle one is reversed
                // with Hadamards when needed.
                let (a, b) = if self.device.coupled(i, j) { (i, j) } else { (j, i) };

                out.push(emit::cnot(&self.register, a, b, pos));
                out.extend(emit::adjacent_cnot(self.device, &self.register, b, a, pos));
                out.push(emit::cnot(&self.register, a, b, pos));

                self.permutation.swap_slots(i, j);
                debug_assert!(self.permutation.is_bijection());
                debug!("inserted swap between {i} and {j}");
            }
            i = j;
        }

        Ok(out)
    }
}

/// Physical index of a reference in the global register.
fn operand(q: &QubitRef, register: &str) -> Option<u32> {
    (q.register == register).then_some(q.index).flatten()
}

/// Map `program` onto `device` with the swap mapper, returning the final
/// permutation.
pub fn map_onto_device(device: &Device, program: &mut Program) -> MapResult<Permutation> {
    SwapMapper::new(device).run(program)
}
