//! Gate construction shared by the mappers.
//!
//! Everything the mappers insert is expressed in the source gate set:
//! `CX` and `U`, with Hadamards as `U(pi/2, 0, pi)`.

use rimfax_qasm::{Expr, Gate, Position, QubitRef};

use crate::device::Device;

pub(crate) fn cnot(register: &str, c: u32, t: u32, pos: Position) -> Gate {
    Gate::Cnot {
        ctrl: QubitRef::single(register, c),
        tgt: QubitRef::single(register, t),
        pos,
    }
}

pub(crate) fn hadamard(register: &str, q: u32, pos: Position) -> Gate {
    Gate::U {
        theta: Expr::pi_over(2),
        phi: Expr::Int(0),
        lambda: Expr::Pi,
        target: QubitRef::single(register, q),
        pos,
    }
}

/// `CX c, t` on an edge only coupled the other way:
/// `H c; H t; CX t, c; H c; H t`.
pub(crate) fn reversed_cnot(register: &str, c: u32, t: u32, pos: Position) -> Vec<Gate> {
    vec![
        hadamard(register, c, pos),
        hadamard(register, t, pos),
        cnot(register, t, c, pos),
        hadamard(register, c, pos),
        hadamard(register, t, pos),
    ]
}

/// A CNOT on an adjacent pair, reversed with Hadamards when the device
/// only supports the opposite direction.
pub(crate) fn adjacent_cnot(
    device: &Device,
    register: &str,
    c: u32,
    t: u32,
    pos: Position,
) -> Vec<Gate> {
    if device.coupled(c, t) {
        vec![cnot(register, c, t, pos)]
    } else {
        reversed_cnot(register, c, t, pos)
    }
}
