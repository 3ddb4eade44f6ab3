//! Hardware mapping for Rimfax
//!
//! This crate maps logical OpenQASM 2.0 circuits, which assume all-to-all
//! connectivity, onto physical devices whose qubit coupling is an arbitrary
//! graph. Every two-qubit gate in the mapped program acts on a directly
//! coupled pair.
//!
//! The pipeline behind [`map_program`]:
//!
//! 1. **Inline**: the front-end lowers the program to `U`/`CX`
//!    (see `rimfax-qasm`); mapping presupposes a fully inlined program.
//! 2. **Layout** ([`compute_layout`]): choose an initial injective map
//!    from logical qubits to physical indices with the `linear`, `eager`
//!    or `bestfit` strategy.
//! 3. **Apply** ([`apply_layout`]): rewrite every laid-out reference to
//!    its physical slot in the global register and resize the declaration
//!    to device width.
//! 4. **Map**: the [`SwapMapper`] walks the program in order, inserting
//!    SWAP chains along shortest paths and tracking the qubit permutation;
//!    the [`SteinerMapper`] instead resynthesises whole CNOT runs over the
//!    topology. Both return the final permutation as a witness of where
//!    each qubit ended up.
//!
//! # Example
//!
//! ```rust
//! use rimfax_map::{map_program, Device, MapConfig};
//! use rimfax_qasm::parse;
//!
//! let mut program = parse(
//!     r#"
//!     OPENQASM 2.0;
//!     include "qelib1.inc";
//!     qreg q[3];
//!     cx q[0], q[2];
//!     "#,
//! )
//! .unwrap();
//!
//! let device = Device::linear(3).unwrap();
//! let permutation = map_program(&mut program, &device, &MapConfig::default()).unwrap();
//!
//! // The non-local CX became a swap chain plus a local CX, and the
//! // permutation records that the contents of slots 0 and 1 traded places.
//! assert_eq!(permutation.as_slice(), &[1, 0, 2]);
//! ```

mod device;
mod emit;
mod error;
mod layout;
mod permutation;
mod steiner;
mod swap;

use std::str::FromStr;

use tracing::info;

use rimfax_qasm::Program;

pub use device::{Device, DeviceBuilder, FIDELITY_1};
pub use error::{MapError, MapResult};
pub use layout::{apply_layout, compute_layout, Layout, LayoutStrategy};
pub use permutation::Permutation;
pub use steiner::{steiner_mapping, SteinerMapper};
pub use swap::{map_onto_device, SwapMapper, DEFAULT_REGISTER};

/// Mapper selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    /// Swap-insertion along shortest paths.
    Swap,
    /// Steiner-tree resynthesis of CNOT runs.
    Steiner,
}

impl FromStr for MapperKind {
    type Err = MapError;

    fn from_str(s: &str) -> MapResult<Self> {
        match s {
            "swap" => Ok(MapperKind::Swap),
            "steiner" => Ok(MapperKind::Steiner),
            other => Err(MapError::UnsupportedMapper(other.to_string())),
        }
    }
}

/// Options for [`map_program`].
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Initial-layout strategy.
    pub layout: LayoutStrategy,
    /// Mapping algorithm.
    pub mapper: MapperKind,
    /// Name of the global register the mapped program uses.
    pub register: String,
    /// Replace every angle expression with its numeric value afterwards.
    pub evaluate_all: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            layout: LayoutStrategy::Linear,
            mapper: MapperKind::Swap,
            register: DEFAULT_REGISTER.into(),
            evaluate_all: false,
        }
    }
}

/// Map `program` onto `device` in place, returning the final permutation.
///
/// The program is inlined first; selector, fit and connectivity failures
/// leave it in an unspecified state and the caller must treat it as
/// invalid (no partial rewrites are ever observable on success paths).
pub fn map_program(
    program: &mut Program,
    device: &Device,
    config: &MapConfig,
) -> MapResult<Permutation> {
    rimfax_qasm::desugar(program)?;
    rimfax_qasm::inline(program)?;

    let layout = compute_layout(config.layout, device, program)?;
    apply_layout(&layout, device, program, &config.register);

    let permutation = match config.mapper {
        MapperKind::Swap => SwapMapper::with_register(device, &config.register).run(program)?,
        MapperKind::Steiner => {
            SteinerMapper::with_register(device, &config.register).run(program)?
        }
    };

    if config.evaluate_all {
        program.fold_expressions();
    }

    info!(
        device = device.name(),
        qubits = device.qubits(),
        mapper = ?config.mapper,
        "mapped program onto device"
    );
    Ok(permutation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parsing() {
        assert_eq!("swap".parse::<MapperKind>().unwrap(), MapperKind::Swap);
        assert_eq!(
            "steiner".parse::<MapperKind>().unwrap(),
            MapperKind::Steiner
        );
        assert!(matches!(
            "sabre".parse::<MapperKind>(),
            Err(MapError::UnsupportedMapper(_))
        ));
    }

    #[test]
    fn test_map_program_end_to_end() {
        let mut program = rimfax_qasm::parse(
            r#"
            OPENQASM 2.0;
            include "qelib1.inc";
            qreg q[3];
            creg c[3];
            h q[0];
            cx q[0], q[2];
            measure q -> c;
            "#,
        )
        .unwrap();

        let device = Device::linear(3).unwrap();
        let perm = map_program(&mut program, &device, &MapConfig::default()).unwrap();

        assert_eq!(perm.as_slice(), &[1, 0, 2]);
        let text = program.to_string();
        assert!(text.contains("qreg q[3];"));
        // The measurement of logical qubit 0 follows it to slot 1.
        assert!(text.contains("measure q[1] -> c[0];"));
    }

    #[test]
    fn test_map_program_evaluate_all() {
        let mut program = rimfax_qasm::parse(
            r#"
            OPENQASM 2.0;
            include "qelib1.inc";
            qreg q[1];
            h q[0];
            "#,
        )
        .unwrap();

        let device = Device::linear(1).unwrap();
        let config = MapConfig {
            evaluate_all: true,
            ..MapConfig::default()
        };
        map_program(&mut program, &device, &config).unwrap();

        let text = program.to_string();
        assert!(!text.contains("pi"), "angles should be numeric: {text}");
    }
}
