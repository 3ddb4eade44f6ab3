//! `Display` implementations emitting `OpenQASM` 2.0 source.

use std::fmt;

use crate::ast::{BinOp, BitRef, Expr, Gate, GateBodyOp, Program, QubitRef, Stmt};

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "OPENQASM {};", self.version)?;
        for stmt in &self.statements {
            writeln!(f, "{stmt}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Include { path } => write!(f, "include \"{path}\";"),
            Stmt::QregDecl { name, size, .. } => write!(f, "qreg {name}[{size}];"),
            Stmt::CregDecl { name, size, .. } => write!(f, "creg {name}[{size}];"),
            Stmt::GateDecl {
                name,
                params,
                formals,
                body,
                ..
            } => {
                write!(f, "gate {name}")?;
                if !params.is_empty() {
                    write!(f, "({})", params.join(", "))?;
                }
                writeln!(f, " {} {{", formals.join(", "))?;
                for op in body {
                    match op {
                        GateBodyOp::Gate(g) => writeln!(f, "    {g}")?,
                        GateBodyOp::Barrier(qs) => writeln!(f, "    barrier {};", refs(qs))?,
                    }
                }
                write!(f, "}}")
            }
            Stmt::OpaqueDecl {
                name,
                params,
                formals,
                ..
            } => {
                write!(f, "opaque {name}")?;
                if !params.is_empty() {
                    write!(f, "({})", params.join(", "))?;
                }
                write!(f, " {};", formals.join(", "))
            }
            Stmt::Gate(gate) => write!(f, "{gate}"),
            Stmt::Measure { qubit, bit, .. } => write!(f, "measure {qubit} -> {bit};"),
            Stmt::Reset { qubit, .. } => write!(f, "reset {qubit};"),
            Stmt::Barrier { qubits, .. } => write!(f, "barrier {};", refs(qubits)),
            Stmt::If {
                register,
                value,
                body,
                ..
            } => write!(f, "if ({register} == {value}) {body}"),
        }
    }
}

fn refs(qubits: &[QubitRef]) -> String {
    qubits
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Cnot { ctrl, tgt, .. } => write!(f, "CX {ctrl}, {tgt};"),
            Gate::U {
                theta,
                phi,
                lambda,
                target,
                ..
            } => write!(f, "U({theta}, {phi}, {lambda}) {target};"),
            Gate::Named {
                name,
                params,
                qubits,
                ..
            } => {
                write!(f, "{name}")?;
                if !params.is_empty() {
                    let params = params
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "({params})")?;
                }
                write!(f, " {};", refs(qubits))
            }
        }
    }
}

impl fmt::Display for QubitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{index}]", self.register),
            None => write!(f, "{}", self.register),
        }
    }
}

impl fmt::Display for BitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{index}]", self.register),
            None => write!(f, "{}", self.register),
        }
    }
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::BinOp { op, .. } => match op {
                BinOp::Add | BinOp::Sub => 1,
                BinOp::Mul | BinOp::Div => 2,
                BinOp::Pow => 3,
            },
            Expr::Neg(_) => 4,
            _ => 5,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Pi => write!(f, "pi"),
            Expr::Int(v) => write!(f, "{v}"),
            Expr::Real(v) => write!(f, "{v}"),
            Expr::Param(name) => write!(f, "{name}"),
            Expr::Neg(e) => {
                if e.precedence() < 4 {
                    write!(f, "-({e})")
                } else {
                    write!(f, "-{e}")
                }
            }
            Expr::BinOp { op, lhs, rhs } => {
                let prec = self.precedence();
                let symbol = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Pow => "^",
                };
                if lhs.precedence() < prec {
                    write!(f, "({lhs})")?;
                } else {
                    write!(f, "{lhs}")?;
                }
                write!(f, "{symbol}")?;
                // Sub, Div and Pow do not associate on the right.
                if rhs.precedence() < prec
                    || (rhs.precedence() == prec && matches!(op, BinOp::Sub | BinOp::Div))
                {
                    write!(f, "({rhs})")
                } else {
                    write!(f, "{rhs}")
                }
            }
            Expr::Fn { func, arg } => write!(f, "{}({arg})", func.name()),
        }
    }
}
