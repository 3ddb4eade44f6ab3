//! Error types for the mapping crate.

use thiserror::Error;

/// Errors that can occur while building devices or mapping programs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MapError {
    /// Bad device construction parameters.
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// A qubit reference exceeds the device width.
    #[error("Qubit {qubit} out of range for device with {qubits} qubits")]
    OutOfRangeQubit { qubit: u32, qubits: u32 },

    /// No path exists between two qubits involved in a two-qubit gate.
    #[error("No connection between qubits {qubit1} and {qubit2}")]
    DisconnectedQubits { qubit1: u32, qubit2: u32 },

    /// Bad layout selector.
    #[error("Unsupported layout algorithm: {0}")]
    UnsupportedLayout(String),

    /// Bad mapper selector.
    #[error("Unsupported mapping algorithm: {0}")]
    UnsupportedMapper(String),

    /// The program needs more qubits than the device has.
    #[error("Program uses {required} qubits but the device has {available}")]
    InsufficientQubits { required: u32, available: u32 },

    /// Device JSON (de)serialization failure.
    #[error("Device serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Front-end failure while preparing the program.
    #[error(transparent)]
    Qasm(#[from] rimfax_qasm::ParseError),
}

/// Result type for mapping operations.
pub type MapResult<T> = Result<T, MapError>;
