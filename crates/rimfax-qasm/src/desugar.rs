//! Register-broadcast expansion.
//!
//! QASM 2.0 lets an operation name a whole register, applying the operation
//! to every element (`h q;` is `h q[0]; h q[1]; …`). The mapper needs every
//! reference in indexed form, so this pass expands broadcasts, checks
//! indices against the declarations and rejects duplicate operands.

use rustc_hash::FxHashMap;

use crate::ast::{BitRef, Gate, Program, QubitRef, Stmt};
use crate::error::{ParseError, ParseResult};

/// Expand register broadcasts so every reference carries an index.
pub fn desugar(program: &mut Program) -> ParseResult<()> {
    let qregs: FxHashMap<String, u32> = program
        .qregs()
        .into_iter()
        .map(|(name, size)| (name.to_string(), size))
        .collect();
    let cregs: FxHashMap<String, u32> = program
        .cregs()
        .into_iter()
        .map(|(name, size)| (name.to_string(), size))
        .collect();

    let statements = std::mem::take(&mut program.statements);
    let mut out = Vec::with_capacity(statements.len());

    for stmt in statements {
        expand_stmt(stmt, &qregs, &cregs, &mut out)?;
    }

    program.statements = out;
    Ok(())
}

fn expand_stmt(
    stmt: Stmt,
    qregs: &FxHashMap<String, u32>,
    cregs: &FxHashMap<String, u32>,
    out: &mut Vec<Stmt>,
) -> ParseResult<()> {
    match stmt {
        Stmt::Gate(gate) => {
            for gate in expand_gate(gate, qregs)? {
                out.push(Stmt::Gate(gate));
            }
        }

        Stmt::Measure { qubit, bit, pos } => {
            let qubit_width = ref_width(&qubit, qregs)?;
            let bit_width = bit_width(&bit, cregs)?;
            if qubit_width != bit_width {
                return Err(ParseError::BroadcastMismatch {
                    first: qubit.register,
                    first_size: qubit_width,
                    second: bit.register,
                    second_size: bit_width,
                });
            }
            for k in 0..qubit_width {
                out.push(Stmt::Measure {
                    qubit: index_ref(&qubit, k),
                    bit: index_bit(&bit, k),
                    pos,
                });
            }
        }

        Stmt::Reset { qubit, pos } => {
            let width = ref_width(&qubit, qregs)?;
            for k in 0..width {
                out.push(Stmt::Reset {
                    qubit: index_ref(&qubit, k),
                    pos,
                });
            }
        }

        Stmt::Barrier { qubits, pos } => {
            let mut expanded = Vec::with_capacity(qubits.len());
            for q in qubits {
                match q.index {
                    Some(index) => {
                        check_qubit(&q.register, index, qregs)?;
                        expanded.push(q);
                    }
                    None => {
                        let size = qreg_size(&q.register, qregs)?;
                        for k in 0..size {
                            expanded.push(QubitRef::single(&q.register, k));
                        }
                    }
                }
            }
            out.push(Stmt::Barrier {
                qubits: expanded,
                pos,
            });
        }

        Stmt::If {
            register,
            value,
            body,
            pos,
        } => {
            let mut inner = Vec::new();
            expand_stmt(*body, qregs, cregs, &mut inner)?;
            for stmt in inner {
                out.push(Stmt::If {
                    register: register.clone(),
                    value,
                    body: Box::new(stmt),
                    pos,
                });
            }
        }

        // Declarations and includes pass through; gate bodies use formal
        // arguments and are expanded at inlining time instead.
        other => out.push(other),
    }

    Ok(())
}

fn expand_gate(gate: Gate, qregs: &FxHashMap<String, u32>) -> ParseResult<Vec<Gate>> {
    // All register-level operands must agree on a single broadcast width.
    let mut width: Option<(String, u32)> = None;
    for q in gate.qubits() {
        if q.index.is_none() {
            let size = qreg_size(&q.register, qregs)?;
            match &width {
                None => width = Some((q.register.clone(), size)),
                Some((first, first_size)) if *first_size != size => {
                    return Err(ParseError::BroadcastMismatch {
                        first: first.clone(),
                        first_size: *first_size,
                        second: q.register.clone(),
                        second_size: size,
                    });
                }
                Some(_) => {}
            }
        }
    }

    let copies = match width {
        None => vec![gate],
        Some((_, width)) => (0..width)
            .map(|k| {
                let mut copy = gate.clone();
                for q in copy.qubits_mut() {
                    if q.index.is_none() {
                        q.index = Some(k);
                    }
                }
                copy
            })
            .collect(),
    };

    for copy in &copies {
        validate_gate(copy, qregs)?;
    }

    Ok(copies)
}

fn validate_gate(gate: &Gate, qregs: &FxHashMap<String, u32>) -> ParseResult<()> {
    let qubits = gate.qubits();
    for (i, q) in qubits.iter().enumerate() {
        let index = q.index.ok_or_else(|| {
            ParseError::Generic(format!("unindexed operand after expansion: {}", q.register))
        })?;
        check_qubit(&q.register, index, qregs)?;

        for other in &qubits[i + 1..] {
            if q.register == other.register && other.index == Some(index) {
                return Err(ParseError::DuplicateQubit {
                    gate: gate.name().to_string(),
                    register: q.register.clone(),
                    index,
                });
            }
        }
    }
    Ok(())
}

fn qreg_size(name: &str, qregs: &FxHashMap<String, u32>) -> ParseResult<u32> {
    qregs
        .get(name)
        .copied()
        .ok_or_else(|| ParseError::UnknownRegister(name.to_string()))
}

fn check_qubit(name: &str, index: u32, qregs: &FxHashMap<String, u32>) -> ParseResult<()> {
    let size = qreg_size(name, qregs)?;
    if index >= size {
        return Err(ParseError::IndexOutOfBounds {
            register: name.to_string(),
            index,
            size,
        });
    }
    Ok(())
}

fn ref_width(q: &QubitRef, qregs: &FxHashMap<String, u32>) -> ParseResult<u32> {
    match q.index {
        Some(index) => {
            check_qubit(&q.register, index, qregs)?;
            Ok(1)
        }
        None => qreg_size(&q.register, qregs),
    }
}

fn bit_width(b: &BitRef, cregs: &FxHashMap<String, u32>) -> ParseResult<u32> {
    let size = cregs
        .get(&b.register)
        .copied()
        .ok_or_else(|| ParseError::UnknownRegister(b.register.clone()))?;
    match b.index {
        Some(index) => {
            if index >= size {
                return Err(ParseError::IndexOutOfBounds {
                    register: b.register.clone(),
                    index,
                    size,
                });
            }
            Ok(1)
        }
        None => Ok(size),
    }
}

fn index_ref(q: &QubitRef, k: u32) -> QubitRef {
    match q.index {
        Some(_) => q.clone(),
        None => QubitRef::single(&q.register, k),
    }
}

fn index_bit(b: &BitRef, k: u32) -> BitRef {
    match b.index {
        Some(_) => b.clone(),
        None => BitRef::single(&b.register, k),
    }
}
