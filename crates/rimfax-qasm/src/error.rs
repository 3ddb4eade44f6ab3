//! Error types for the QASM front-end.

use thiserror::Error;

/// Errors that can occur while parsing or transforming a program.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Lexer error (invalid token).
    #[error("Lexer error at position {position}: {message}")]
    LexerError { position: usize, message: String },

    /// Unexpected token.
    #[error("Unexpected token at line {line}: expected {expected}, found {found}")]
    UnexpectedToken {
        line: usize,
        expected: String,
        found: String,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of input: {0}")]
    UnexpectedEof(String),

    /// Invalid version.
    #[error("Invalid OPENQASM version: {0}")]
    InvalidVersion(String),

    /// Reference to an undeclared register.
    #[error("Undeclared register: {0}")]
    UnknownRegister(String),

    /// Application of an undeclared gate.
    #[error("Unknown gate: {0}")]
    UnknownGate(String),

    /// Application of an opaque gate, which cannot be inlined.
    #[error("Opaque gate '{0}' cannot be inlined")]
    OpaqueGate(String),

    /// Wrong number of qubit arguments.
    #[error("Gate '{gate}' expects {expected} qubits, got {got}")]
    WrongQubitCount {
        gate: String,
        expected: usize,
        got: usize,
    },

    /// Wrong number of parameters.
    #[error("Gate '{gate}' expects {expected} parameters, got {got}")]
    WrongParameterCount {
        gate: String,
        expected: usize,
        got: usize,
    },

    /// Register index out of bounds.
    #[error("Index {index} out of bounds for register '{register}' of size {size}")]
    IndexOutOfBounds {
        register: String,
        index: u32,
        size: u32,
    },

    /// The same qubit appears twice in one gate application.
    #[error("Gate '{gate}' applied to duplicate qubit {register}[{index}]")]
    DuplicateQubit {
        gate: String,
        register: String,
        index: u32,
    },

    /// Registers of different sizes in a broadcast application.
    #[error("Broadcast over registers of different sizes: '{first}' has {first_size}, '{second}' has {second_size}")]
    BroadcastMismatch {
        first: String,
        first_size: u32,
        second: String,
        second_size: u32,
    },

    /// Generic parse error.
    #[error("Parse error: {0}")]
    Generic(String),
}

/// Result type for front-end operations.
pub type ParseResult<T> = Result<T, ParseError>;
