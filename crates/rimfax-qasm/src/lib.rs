//! `OpenQASM` 2.0 front-end for Rimfax
//!
//! This crate parses, transforms and prints the QASM 2.0 subset the Rimfax
//! mapping core operates on. The pipeline a program goes through before
//! hardware mapping is:
//!
//! 1. [`parse`]: source text to the statement-ordered AST.
//! 2. [`desugar`]: register broadcasts expanded so every reference is
//!    indexed (`h q;` becomes `h q[0]; h q[1]; ...`).
//! 3. [`inline`]: user gate declarations and the `qelib1.inc` standard
//!    library expanded down to the `U`/`CX` primitives.
//!
//! After the pipeline the program consists only of register declarations,
//! `U`/`CX` applications, measurements, resets, barriers and classical
//! conditionals, which are the forms the mappers rewrite.
//!
//! # Example
//!
//! ```rust
//! use rimfax_qasm::{parse, desugar, inline};
//!
//! let source = r#"
//!     OPENQASM 2.0;
//!     include "qelib1.inc";
//!     qreg q[2];
//!     creg c[2];
//!     h q[0];
//!     cx q[0], q[1];
//!     measure q -> c;
//! "#;
//!
//! let mut program = parse(source).unwrap();
//! desugar(&mut program).unwrap();
//! inline(&mut program).unwrap();
//!
//! // Only U/CX remain; print back as QASM.
//! let text = program.to_string();
//! assert!(text.contains("CX q[0], q[1];"));
//! ```

pub mod ast;
mod desugar;
mod error;
mod inline;
mod lexer;
mod parser;
mod printer;

pub use ast::{
    BinOp, BitRef, Expr, Gate, GateBodyOp, Position, Program, QubitRef, Stmt, UnaryFn,
};
pub use desugar::desugar;
pub use error::{ParseError, ParseResult};
pub use inline::inline;
pub use parser::parse;
