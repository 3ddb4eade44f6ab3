//! End-to-end mapping scenarios and invariants.
//!
//! The semantic checks compare the mapped program against the original on
//! a dense state-vector simulator, for every basis input, after undoing the
//! mapper's final permutation. The gate identities the mappers use are
//! exact, so the comparison needs no global-phase allowance.

use num_complex::Complex64;

use rimfax_map::{
    map_program, Device, DeviceBuilder, LayoutStrategy, MapConfig, MapError, MapperKind,
    Permutation,
};
use rimfax_qasm::{desugar, inline, parse, Gate, Program, Stmt};

fn prepare(source: &str) -> Program {
    let mut program = parse(source).unwrap();
    desugar(&mut program).unwrap();
    inline(&mut program).unwrap();
    program
}

fn config(layout: LayoutStrategy, mapper: MapperKind) -> MapConfig {
    MapConfig {
        layout,
        mapper,
        ..MapConfig::default()
    }
}

/// Every CX in the program acts on a pair adjacent in the symmetric
/// closure of the device couplings.
fn assert_local(program: &Program, device: &Device) {
    fn check(stmt: &Stmt, device: &Device) {
        match stmt {
            Stmt::Gate(Gate::Cnot { ctrl, tgt, .. }) => {
                let (c, t) = (ctrl.index.unwrap(), tgt.index.unwrap());
                assert!(device.connected(c, t), "CX {c},{t} is not coupled");
            }
            Stmt::If { body, .. } => check(body, device),
            _ => {}
        }
    }
    for stmt in &program.statements {
        check(stmt, device);
    }
}

fn count_cnots(program: &Program) -> usize {
    fn gate_of(stmt: &Stmt) -> Option<&Gate> {
        match stmt {
            Stmt::Gate(g) => Some(g),
            Stmt::If { body, .. } => match &**body {
                Stmt::Gate(g) => Some(g),
                _ => None,
            },
            _ => None,
        }
    }
    program
        .statements
        .iter()
        .filter(|s| matches!(gate_of(s), Some(Gate::Cnot { .. })))
        .count()
}

// =========================================================================
// State-vector reference simulator
// =========================================================================

struct Sim {
    state: Vec<Complex64>,
}

impl Sim {
    fn basis(n: usize, index: usize) -> Self {
        let mut state = vec![Complex64::new(0.0, 0.0); 1 << n];
        state[index] = Complex64::new(1.0, 0.0);
        Self { state }
    }

    fn apply_u(&mut self, theta: f64, phi: f64, lambda: f64, q: usize) {
        let half = theta / 2.0;
        let m00 = Complex64::new(half.cos(), 0.0);
        let m01 = -Complex64::from_polar(1.0, lambda) * half.sin();
        let m10 = Complex64::from_polar(1.0, phi) * half.sin();
        let m11 = Complex64::from_polar(1.0, phi + lambda) * half.cos();

        let bit = 1usize << q;
        for i in 0..self.state.len() {
            if i & bit == 0 {
                let a = self.state[i];
                let b = self.state[i | bit];
                self.state[i] = m00 * a + m01 * b;
                self.state[i | bit] = m10 * a + m11 * b;
            }
        }
    }

    fn apply_cx(&mut self, c: usize, t: usize) {
        let (cbit, tbit) = (1usize << c, 1usize << t);
        for i in 0..self.state.len() {
            if i & cbit != 0 && i & tbit == 0 {
                self.state.swap(i, i | tbit);
            }
        }
    }

    fn run(&mut self, program: &Program) {
        for stmt in &program.statements {
            match stmt {
                Stmt::Gate(Gate::U {
                    theta,
                    phi,
                    lambda,
                    target,
                    ..
                }) => {
                    self.apply_u(
                        theta.eval().unwrap(),
                        phi.eval().unwrap(),
                        lambda.eval().unwrap(),
                        target.index.unwrap() as usize,
                    );
                }
                Stmt::Gate(Gate::Cnot { ctrl, tgt, .. }) => {
                    self.apply_cx(ctrl.index.unwrap() as usize, tgt.index.unwrap() as usize);
                }
                Stmt::Gate(Gate::Named { name, .. }) => {
                    panic!("simulator expects an inlined program, found '{name}'")
                }
                _ => {}
            }
        }
    }
}

/// Relocate basis amplitudes: bit `i` of the input index moves to bit
/// `perm[i]` of the output index.
fn relocate(state: &[Complex64], perm: &Permutation) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); state.len()];
    for (x, &amp) in state.iter().enumerate() {
        let mut y = 0usize;
        for (i, p) in perm.iter() {
            if x & (1 << i) != 0 {
                y |= 1 << p;
            }
        }
        out[y] = amp;
    }
    out
}

/// The mapped program, post-composed with the inverse of the returned
/// permutation, computes the same state as the original for every basis
/// input.
fn assert_equivalent(original: &Program, mapped: &Program, perm: &Permutation, n: usize) {
    for input in 0..1usize << n {
        let mut reference = Sim::basis(n, input);
        reference.run(original);
        let expected = relocate(&reference.state, perm);

        let mut actual = Sim::basis(n, input);
        actual.run(mapped);

        for (i, (a, e)) in actual.state.iter().zip(&expected).enumerate() {
            assert!(
                (a - e).norm() < 1e-9,
                "input {input}, amplitude {i}: {a} != {e}"
            );
        }
    }
}

/// Map with the given options and check the locality and bijection
/// invariants plus semantic equivalence against the unmapped program.
fn map_and_verify(
    source: &str,
    device: &Device,
    layout: LayoutStrategy,
    mapper: MapperKind,
) -> (Program, Permutation) {
    let mut program = parse(source).unwrap();
    let perm = map_program(&mut program, device, &config(layout, mapper)).unwrap();

    assert!(perm.is_bijection());
    assert_local(&program, device);

    // Reference: the same program inlined, with the same layout applied,
    // but not mapped. This is exactly what the mapper saw.
    let mut reference = prepare(source);
    let chosen = rimfax_map::compute_layout(layout, device, &reference).unwrap();
    rimfax_map::apply_layout(&chosen, device, &mut reference, "q");

    assert_equivalent(&reference, &program, &perm, device.qubits() as usize);
    (program, perm)
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn scenario_a_linear_chain_no_swaps() {
    let device = Device::linear(3).unwrap();
    let source = r"
        OPENQASM 2.0;
        qreg q[3];
        CX q[0], q[1];
        CX q[1], q[2];
    ";

    let mut program = parse(source).unwrap();
    let perm = map_program(
        &mut program,
        &device,
        &config(LayoutStrategy::Linear, MapperKind::Swap),
    )
    .unwrap();

    assert!(perm.is_identity());
    let text = program.to_string();
    assert!(text.contains("CX q[0], q[1];"));
    assert!(text.contains("CX q[1], q[2];"));
    assert_eq!(count_cnots(&program), 2);
}

#[test]
fn scenario_b_linear_chain_one_swap() {
    let device = Device::linear(3).unwrap();
    let source = r"
        OPENQASM 2.0;
        qreg q[3];
        CX q[0], q[2];
    ";

    let (program, perm) =
        map_and_verify(source, &device, LayoutStrategy::Linear, MapperKind::Swap);

    // SWAP(0,1) as three CNOTs, then the local CX.
    let expected = "\
CX q[0], q[1];
CX q[1], q[0];
CX q[0], q[1];
CX q[1], q[2];
";
    assert!(program.to_string().ends_with(expected));
    assert_eq!(perm.as_slice(), &[1, 0, 2]);
}

#[test]
fn scenario_c_directed_edge_hadamard_sandwich() {
    // The device arrives over the JSON interface with a directed coupling.
    let device = Device::from_json(
        r#"{
            "name": "directed pair",
            "n": 2,
            "couplings": [ { "control": 0, "target": 1, "directed": true } ]
        }"#,
    )
    .unwrap();

    let source = r"
        OPENQASM 2.0;
        qreg q[2];
        CX q[1], q[0];
    ";

    let (program, perm) =
        map_and_verify(source, &device, LayoutStrategy::Linear, MapperKind::Swap);

    assert!(perm.is_identity());
    let expected = "\
U(pi/2, 0, pi) q[1];
U(pi/2, 0, pi) q[0];
CX q[0], q[1];
U(pi/2, 0, pi) q[1];
U(pi/2, 0, pi) q[0];
";
    assert!(program.to_string().ends_with(expected));
}

#[test]
fn scenario_d_disconnected_components_abort() {
    let mut builder = DeviceBuilder::new("split", 4).unwrap();
    builder.add_edge(0, 1).add_edge(2, 3);
    let device = builder.build();

    let source = r"
        OPENQASM 2.0;
        qreg q[4];
        CX q[0], q[2];
    ";

    for mapper in [MapperKind::Swap, MapperKind::Steiner] {
        let mut program = parse(source).unwrap();
        let err = map_program(&mut program, &device, &config(LayoutStrategy::Linear, mapper))
            .unwrap_err();
        assert!(
            matches!(err, MapError::DisconnectedQubits { .. }),
            "{mapper:?}: {err}"
        );
    }
}

#[test]
fn scenario_e_bestfit_beats_linear_on_ring() {
    // Interleaved heavy pairs on a 4-ring: q0-q2 and q1-q3.
    let device = Device::ring(4).unwrap();
    let source = r"
        OPENQASM 2.0;
        qreg q[4];
        CX q[0], q[2];
        CX q[0], q[2];
        CX q[1], q[3];
        CX q[1], q[3];
    ";

    let (best, best_perm) =
        map_and_verify(source, &device, LayoutStrategy::BestFit, MapperKind::Swap);
    // Every heavy pair landed on a coupled edge: no swaps at all.
    assert!(best_perm.is_identity());
    assert_eq!(count_cnots(&best), 4);

    let (linear, _) = map_and_verify(source, &device, LayoutStrategy::Linear, MapperKind::Swap);
    assert!(
        count_cnots(&linear) > count_cnots(&best),
        "linear should need swaps here"
    );
}

#[test]
fn scenario_f_teleportation_round_trip() {
    let device = Device::linear(3).unwrap();
    let source = r#"
        OPENQASM 2.0;
        include "qelib1.inc";
        qreg a[1];
        qreg b[2];
        creg c0[1];
        creg c1[1];
        h b[0];
        cx b[0], b[1];
        cx a[0], b[0];
        h a[0];
        measure a[0] -> c0[0];
        measure b[0] -> c1[0];
        if (c1 == 1) x b[1];
        if (c0 == 1) z b[1];
    "#;

    let mut program = parse(source).unwrap();
    let perm = map_program(
        &mut program,
        &device,
        &config(LayoutStrategy::Linear, MapperKind::Swap),
    )
    .unwrap();

    // a[0] -> 0, b[0] -> 1, b[1] -> 2: both CNOTs are local, no swaps.
    assert!(perm.is_identity());
    assert_eq!(count_cnots(&program), 2);
    assert_local(&program, &device);

    let text = program.to_string();
    assert!(text.contains("qreg q[3];"));
    assert!(text.contains("CX q[1], q[2];"));
    assert!(text.contains("CX q[0], q[1];"));
    assert!(text.contains("measure q[0] -> c0[0];"));
    assert!(text.contains("measure q[1] -> c1[0];"));
    // The conditional bodies were inlined to U and their operand follows
    // the (identity) permutation to slot 2.
    assert!(text.contains("if (c1 == 1) U(pi, 0, pi) q[2];"));
    assert!(text.contains("if (c0 == 1) U(0, 0, pi) q[2];"));
}

// =========================================================================
// Invariants
// =========================================================================

#[test]
fn swap_mapper_preserves_semantics_on_chain() {
    let device = Device::linear(3).unwrap();
    map_and_verify(
        r"
        OPENQASM 2.0;
        qreg q[3];
        U(pi/2, 0, pi) q[0];
        CX q[0], q[2];
        CX q[2], q[1];
        U(pi/4, 0, 0) q[2];
        CX q[1], q[0];
        ",
        &device,
        LayoutStrategy::Linear,
        MapperKind::Swap,
    );
}

#[test]
fn swap_mapper_preserves_semantics_on_directed_chain() {
    // Couplings only point away from qubit 0; every reversed CNOT needs
    // the Hadamard sandwich.
    let mut builder = DeviceBuilder::new("one way", 3).unwrap();
    builder.add_directed_edge(0, 1).add_directed_edge(1, 2);
    let device = builder.build();

    map_and_verify(
        r"
        OPENQASM 2.0;
        qreg q[3];
        CX q[2], q[0];
        CX q[1], q[0];
        ",
        &device,
        LayoutStrategy::Linear,
        MapperKind::Swap,
    );
}

#[test]
fn steiner_mapper_preserves_semantics() {
    let device = Device::linear(3).unwrap();
    map_and_verify(
        r"
        OPENQASM 2.0;
        qreg q[3];
        U(pi/2, 0, pi) q[1];
        CX q[0], q[2];
        CX q[1], q[0];
        CX q[2], q[1];
        ",
        &device,
        LayoutStrategy::Linear,
        MapperKind::Steiner,
    );
}

#[test]
fn steiner_mapper_preserves_semantics_on_star() {
    let mut builder = DeviceBuilder::new("star", 4).unwrap();
    builder.add_edge(0, 1).add_edge(0, 2).add_edge(0, 3);
    let device = builder.build();

    map_and_verify(
        r"
        OPENQASM 2.0;
        qreg q[4];
        CX q[1], q[2];
        CX q[2], q[3];
        CX q[3], q[1];
        ",
        &device,
        LayoutStrategy::Linear,
        MapperKind::Steiner,
    );
}

#[test]
fn eager_layout_preserves_semantics() {
    let device = Device::linear(4).unwrap();
    map_and_verify(
        r"
        OPENQASM 2.0;
        qreg q[4];
        CX q[3], q[1];
        CX q[0], q[3];
        U(pi/2, 0, pi) q[2];
        CX q[2], q[0];
        ",
        &device,
        LayoutStrategy::Eager,
        MapperKind::Swap,
    );
}

#[test]
fn remapping_onto_fully_connected_is_a_no_op() {
    let source = r#"
        OPENQASM 2.0;
        include "qelib1.inc";
        qreg q[3];
        h q[0];
        cx q[0], q[2];
        cx q[2], q[1];
    "#;

    // Inline up front so the mapping itself has nothing left to change.
    let expected = prepare(source);
    let device = Device::fully_connected(3).unwrap();

    let mut program = parse(source).unwrap();
    let perm = map_program(
        &mut program,
        &device,
        &config(LayoutStrategy::Linear, MapperKind::Swap),
    )
    .unwrap();

    assert!(perm.is_identity());
    // Register resizing is the only permitted difference; with a device of
    // matching width even that is invisible.
    assert_eq!(expected.to_string(), program.to_string());
}

#[test]
fn selector_errors_leave_program_usable() {
    assert!(matches!(
        "sabre".parse::<LayoutStrategy>(),
        Err(MapError::UnsupportedLayout(_))
    ));
    assert!(matches!(
        "lookahead".parse::<MapperKind>(),
        Err(MapError::UnsupportedMapper(_))
    ));
}

#[test]
fn insufficient_qubits_detected_before_rewriting() {
    let device = Device::linear(2).unwrap();
    let mut program = parse(
        r"
        OPENQASM 2.0;
        qreg q[4];
        CX q[0], q[3];
        ",
    )
    .unwrap();

    let err = map_program(
        &mut program,
        &device,
        &config(LayoutStrategy::Linear, MapperKind::Swap),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        MapError::InsufficientQubits {
            required: 4,
            available: 2
        }
    ));
}

#[test]
fn shortest_paths_match_distances_everywhere() {
    let mut builder = DeviceBuilder::new("lattice", 6).unwrap();
    builder
        .add_edge(0, 1)
        .add_edge(1, 2)
        .add_edge(0, 3)
        .add_edge(1, 4)
        .add_edge(2, 5)
        .add_edge(3, 4)
        .add_edge(4, 5);
    let device = builder.build();

    for a in 0..6 {
        for b in 0..6 {
            assert_eq!(device.distance(a, b), device.distance(b, a));
            let path = device.shortest_path(a, b).unwrap();
            if a == b {
                assert!(path.is_empty());
                continue;
            }
            assert_eq!(path.len() as u32, device.distance(a, b).unwrap());
            assert_eq!(*path.last().unwrap(), b);
            let mut prev = a;
            for &hop in &path {
                assert!(device.connected(prev, hop));
                prev = hop;
            }
        }
    }
}
