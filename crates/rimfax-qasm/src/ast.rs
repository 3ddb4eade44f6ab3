//! Abstract syntax tree for `OpenQASM` 2.0.
//!
//! The tree is statement-ordered: a [`Program`] is the version header plus a
//! flat list of [`Stmt`] values, and transformation passes (desugaring,
//! inlining, hardware mapping) rewrite the statement list in place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source position of a token or statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Reference to a qubit: a register name plus an optional offset.
///
/// A reference without an offset denotes the whole register and only
/// survives until desugaring, which rewrites every application to indexed
/// form. Inside gate declaration bodies the register name is a formal
/// argument and the offset is always absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QubitRef {
    pub register: String,
    pub index: Option<u32>,
}

impl QubitRef {
    /// Reference a single qubit `register[index]`.
    pub fn single(register: impl Into<String>, index: u32) -> Self {
        Self {
            register: register.into(),
            index: Some(index),
        }
    }

    /// Reference an entire register.
    pub fn register(register: impl Into<String>) -> Self {
        Self {
            register: register.into(),
            index: None,
        }
    }
}

/// Reference to a classical bit or bit register.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitRef {
    pub register: String,
    pub index: Option<u32>,
}

impl BitRef {
    /// Reference a single bit `register[index]`.
    pub fn single(register: impl Into<String>, index: u32) -> Self {
        Self {
            register: register.into(),
            index: Some(index),
        }
    }

    /// Reference an entire register.
    pub fn register(register: impl Into<String>) -> Self {
        Self {
            register: register.into(),
            index: None,
        }
    }
}

/// Binary operators in angle expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Unary functions in angle expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryFn {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
}

impl UnaryFn {
    pub fn name(self) -> &'static str {
        match self {
            UnaryFn::Sin => "sin",
            UnaryFn::Cos => "cos",
            UnaryFn::Tan => "tan",
            UnaryFn::Exp => "exp",
            UnaryFn::Ln => "ln",
            UnaryFn::Sqrt => "sqrt",
        }
    }

    /// Look up a function by its QASM name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(UnaryFn::Sin),
            "cos" => Some(UnaryFn::Cos),
            "tan" => Some(UnaryFn::Tan),
            "exp" => Some(UnaryFn::Exp),
            "ln" => Some(UnaryFn::Ln),
            "sqrt" => Some(UnaryFn::Sqrt),
            _ => None,
        }
    }
}

/// An angle expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// The constant π.
    Pi,
    /// Integer literal.
    Int(i64),
    /// Real literal.
    Real(f64),
    /// A gate parameter, only valid inside gate declaration bodies.
    Param(String),
    /// Negation.
    Neg(Box<Expr>),
    /// Binary operation.
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Unary function application.
    Fn { func: UnaryFn, arg: Box<Expr> },
}

impl Expr {
    pub fn binop(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binop(BinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::binop(BinOp::Sub, lhs, rhs)
    }

    pub fn div(lhs: Expr, rhs: Expr) -> Self {
        Self::binop(BinOp::Div, lhs, rhs)
    }

    pub fn neg(e: Expr) -> Self {
        Expr::Neg(Box::new(e))
    }

    /// `pi / d`, the most common angle shape in decompositions.
    pub fn pi_over(d: i64) -> Self {
        Self::div(Expr::Pi, Expr::Int(d))
    }

    /// Evaluate to a number. Returns `None` while unbound parameters remain.
    pub fn eval(&self) -> Option<f64> {
        match self {
            Expr::Pi => Some(std::f64::consts::PI),
            Expr::Int(v) => Some(*v as f64),
            Expr::Real(v) => Some(*v),
            Expr::Param(_) => None,
            Expr::Neg(e) => e.eval().map(|v| -v),
            Expr::BinOp { op, lhs, rhs } => {
                let l = lhs.eval()?;
                let r = rhs.eval()?;
                Some(match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l / r,
                    BinOp::Pow => l.powf(r),
                })
            }
            Expr::Fn { func, arg } => {
                let v = arg.eval()?;
                Some(match func {
                    UnaryFn::Sin => v.sin(),
                    UnaryFn::Cos => v.cos(),
                    UnaryFn::Tan => v.tan(),
                    UnaryFn::Exp => v.exp(),
                    UnaryFn::Ln => v.ln(),
                    UnaryFn::Sqrt => v.sqrt(),
                })
            }
        }
    }

    /// Substitute parameters by name, leaving unknown names untouched.
    pub fn subst(&self, bindings: &rustc_hash::FxHashMap<String, Expr>) -> Expr {
        match self {
            Expr::Param(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Expr::Neg(e) => Expr::neg(e.subst(bindings)),
            Expr::BinOp { op, lhs, rhs } => {
                Expr::binop(*op, lhs.subst(bindings), rhs.subst(bindings))
            }
            Expr::Fn { func, arg } => Expr::Fn {
                func: *func,
                arg: Box::new(arg.subst(bindings)),
            },
            _ => self.clone(),
        }
    }
}

/// A gate application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gate {
    /// The built-in controlled-NOT: `CX ctrl, tgt;`
    Cnot {
        ctrl: QubitRef,
        tgt: QubitRef,
        pos: Position,
    },
    /// The built-in single-qubit unitary: `U(theta, phi, lambda) tgt;`
    U {
        theta: Expr,
        phi: Expr,
        lambda: Expr,
        target: QubitRef,
        pos: Position,
    },
    /// Application of a declared or standard-library gate.
    Named {
        name: String,
        params: Vec<Expr>,
        qubits: Vec<QubitRef>,
        pos: Position,
    },
}

impl Gate {
    /// Source position of the application.
    pub fn pos(&self) -> Position {
        match self {
            Gate::Cnot { pos, .. } | Gate::U { pos, .. } | Gate::Named { pos, .. } => *pos,
        }
    }

    /// Name as written in source.
    pub fn name(&self) -> &str {
        match self {
            Gate::Cnot { .. } => "CX",
            Gate::U { .. } => "U",
            Gate::Named { name, .. } => name,
        }
    }

    /// Qubit operands in order.
    pub fn qubits(&self) -> Vec<&QubitRef> {
        match self {
            Gate::Cnot { ctrl, tgt, .. } => vec![ctrl, tgt],
            Gate::U { target, .. } => vec![target],
            Gate::Named { qubits, .. } => qubits.iter().collect(),
        }
    }

    /// Mutable qubit operands in order.
    pub fn qubits_mut(&mut self) -> Vec<&mut QubitRef> {
        match self {
            Gate::Cnot { ctrl, tgt, .. } => vec![ctrl, tgt],
            Gate::U { target, .. } => vec![target],
            Gate::Named { qubits, .. } => qubits.iter_mut().collect(),
        }
    }

    /// Mutable angle expressions of the application.
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Gate::Cnot { .. } => vec![],
            Gate::U {
                theta, phi, lambda, ..
            } => vec![theta, phi, lambda],
            Gate::Named { params, .. } => params.iter_mut().collect(),
        }
    }
}

/// An operation inside a gate declaration body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateBodyOp {
    Gate(Gate),
    Barrier(Vec<QubitRef>),
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `include "file";`
    Include { path: String },

    /// `qreg name[size];`
    QregDecl {
        name: String,
        size: u32,
        pos: Position,
    },

    /// `creg name[size];`
    CregDecl {
        name: String,
        size: u32,
        pos: Position,
    },

    /// `gate name(params) formals { body }`
    GateDecl {
        name: String,
        params: Vec<String>,
        formals: Vec<String>,
        body: Vec<GateBodyOp>,
        pos: Position,
    },

    /// `opaque name(params) formals;`
    OpaqueDecl {
        name: String,
        params: Vec<String>,
        formals: Vec<String>,
        pos: Position,
    },

    /// A gate application.
    Gate(Gate),

    /// `measure qubit -> bit;`
    Measure {
        qubit: QubitRef,
        bit: BitRef,
        pos: Position,
    },

    /// `reset qubit;`
    Reset { qubit: QubitRef, pos: Position },

    /// `barrier qubits;`
    Barrier {
        qubits: Vec<QubitRef>,
        pos: Position,
    },

    /// `if (register == value) qop;`
    ///
    /// The body is restricted to quantum operations (gate application,
    /// measure, reset) by the grammar; the parser upholds this.
    If {
        register: String,
        value: u64,
        body: Box<Stmt>,
        pos: Position,
    },
}

/// A complete QASM 2.0 program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// QASM version as written (normally "2.0").
    pub version: String,
    /// Statements in program order.
    pub statements: Vec<Stmt>,
}

impl Program {
    /// Create an empty program with the standard version header.
    pub fn new() -> Self {
        Self {
            version: "2.0".into(),
            statements: vec![],
        }
    }

    /// Declared quantum registers as `(name, size)` pairs, in order.
    pub fn qregs(&self) -> Vec<(&str, u32)> {
        self.statements
            .iter()
            .filter_map(|s| match s {
                Stmt::QregDecl { name, size, .. } => Some((name.as_str(), *size)),
                _ => None,
            })
            .collect()
    }

    /// Declared classical registers as `(name, size)` pairs, in order.
    pub fn cregs(&self) -> Vec<(&str, u32)> {
        self.statements
            .iter()
            .filter_map(|s| match s {
                Stmt::CregDecl { name, size, .. } => Some((name.as_str(), *size)),
                _ => None,
            })
            .collect()
    }

    /// Total number of declared qubits.
    pub fn num_qubits(&self) -> u32 {
        self.qregs().iter().map(|(_, size)| size).sum()
    }

    /// Replace every angle expression with its numeric value.
    ///
    /// Expressions still containing unbound parameters are left untouched;
    /// after inlining none remain.
    pub fn fold_expressions(&mut self) {
        for stmt in &mut self.statements {
            fold_stmt(stmt);
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

fn fold_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Gate(gate) => {
            for expr in gate.exprs_mut() {
                if let Some(v) = expr.eval() {
                    *expr = Expr::Real(v);
                }
            }
        }
        Stmt::If { body, .. } => fold_stmt(body),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_expr_eval() {
        let expr = Expr::pi_over(2);
        assert!((expr.eval().unwrap() - PI / 2.0).abs() < 1e-12);

        let expr = Expr::neg(Expr::pi_over(4));
        assert!((expr.eval().unwrap() + PI / 4.0).abs() < 1e-12);

        let expr = Expr::Fn {
            func: UnaryFn::Cos,
            arg: Box::new(Expr::Int(0)),
        };
        assert!((expr.eval().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_expr_param_subst() {
        let mut bindings = rustc_hash::FxHashMap::default();
        bindings.insert("theta".to_string(), Expr::pi_over(2));

        let expr = Expr::div(Expr::Param("theta".into()), Expr::Int(2));
        assert!(expr.eval().is_none());

        let bound = expr.subst(&bindings);
        assert!((bound.eval().unwrap() - PI / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_gate_accessors() {
        let mut gate = Gate::Cnot {
            ctrl: QubitRef::single("q", 0),
            tgt: QubitRef::single("q", 1),
            pos: Position::default(),
        };
        assert_eq!(gate.name(), "CX");
        assert_eq!(gate.qubits().len(), 2);

        gate.qubits_mut()[1].index = Some(2);
        assert_eq!(gate.qubits()[1].index, Some(2));
    }

    #[test]
    fn test_fold_expressions() {
        let mut program = Program::new();
        program.statements.push(Stmt::Gate(Gate::U {
            theta: Expr::pi_over(2),
            phi: Expr::Int(0),
            lambda: Expr::Pi,
            target: QubitRef::single("q", 0),
            pos: Position::default(),
        }));

        program.fold_expressions();
        match &program.statements[0] {
            Stmt::Gate(Gate::U { theta, .. }) => {
                assert_eq!(theta, &Expr::Real(PI / 2.0));
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }
}
