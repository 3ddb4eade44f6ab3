//! Gate inlining.
//!
//! Expands user gate declarations (substituting parameters and qubit
//! arguments) and the `qelib1.inc` standard library down to the `U`/`CX`
//! primitives. Mapping presupposes a fully inlined program: every
//! two-qubit interaction must be a `CX` for the routers to see it.
//!
//! Declarations are removed from the statement list once expanded. Opaque
//! gates have no body and are rejected when applied.

use rustc_hash::FxHashMap;

use crate::ast::{Expr, Gate, GateBodyOp, Position, Program, QubitRef, Stmt};
use crate::error::{ParseError, ParseResult};

const MAX_DEPTH: usize = 128;

struct GateDef {
    params: Vec<String>,
    formals: Vec<String>,
    body: Vec<GateBodyOp>,
}

/// Inline every gate application down to `U` and `CX`.
pub fn inline(program: &mut Program) -> ParseResult<()> {
    let mut defs: FxHashMap<String, GateDef> = FxHashMap::default();
    let mut opaques: Vec<String> = Vec::new();

    let statements = std::mem::take(&mut program.statements);
    let mut out = Vec::with_capacity(statements.len());

    for stmt in statements {
        match stmt {
            Stmt::GateDecl {
                name,
                params,
                formals,
                body,
                ..
            } => {
                defs.insert(
                    name,
                    GateDef {
                        params,
                        formals,
                        body,
                    },
                );
            }
            Stmt::OpaqueDecl { name, .. } => opaques.push(name),

            Stmt::Gate(gate) => {
                for op in expand(&gate, &defs, &opaques, 0)? {
                    out.push(match op {
                        GateBodyOp::Gate(g) => Stmt::Gate(g),
                        GateBodyOp::Barrier(qubits) => Stmt::Barrier {
                            qubits,
                            pos: gate.pos(),
                        },
                    });
                }
            }

            Stmt::If {
                register,
                value,
                body,
                pos,
            } => match *body {
                Stmt::Gate(gate) => {
                    for op in expand(&gate, &defs, &opaques, 0)? {
                        let GateBodyOp::Gate(g) = op else {
                            return Err(ParseError::Generic(format!(
                                "barrier in conditional expansion of '{}'",
                                gate.name()
                            )));
                        };
                        out.push(Stmt::If {
                            register: register.clone(),
                            value,
                            body: Box::new(Stmt::Gate(g)),
                            pos,
                        });
                    }
                }
                other => out.push(Stmt::If {
                    register,
                    value,
                    body: Box::new(other),
                    pos,
                }),
            },

            other => out.push(other),
        }
    }

    program.statements = out;
    Ok(())
}

fn expand(
    gate: &Gate,
    defs: &FxHashMap<String, GateDef>,
    opaques: &[String],
    depth: usize,
) -> ParseResult<Vec<GateBodyOp>> {
    if depth > MAX_DEPTH {
        return Err(ParseError::Generic(format!(
            "gate expansion exceeds depth {MAX_DEPTH} at '{}'",
            gate.name()
        )));
    }

    let (name, params, qubits, pos) = match gate {
        Gate::Cnot { .. } | Gate::U { .. } => return Ok(vec![GateBodyOp::Gate(gate.clone())]),
        Gate::Named {
            name,
            params,
            qubits,
            pos,
        } => (name.as_str(), params, qubits, *pos),
    };

    if let Some(def) = defs.get(name) {
        return expand_declared(name, def, params, qubits, pos, defs, opaques, depth);
    }
    if opaques.iter().any(|o| o == name) {
        return Err(ParseError::OpaqueGate(name.to_string()));
    }

    let body = qelib_body(name, params, qubits, pos)?;
    let mut out = Vec::with_capacity(body.len());
    for g in body {
        out.extend(expand(&g, defs, opaques, depth + 1)?);
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn expand_declared(
    name: &str,
    def: &GateDef,
    params: &[Expr],
    qubits: &[QubitRef],
    pos: Position,
    defs: &FxHashMap<String, GateDef>,
    opaques: &[String],
    depth: usize,
) -> ParseResult<Vec<GateBodyOp>> {
    check_arity(name, def.params.len(), params, def.formals.len(), qubits)?;

    let bindings: FxHashMap<String, Expr> = def
        .params
        .iter()
        .cloned()
        .zip(params.iter().cloned())
        .collect();
    let arguments: FxHashMap<&str, &QubitRef> = def
        .formals
        .iter()
        .map(String::as_str)
        .zip(qubits.iter())
        .collect();

    let resolve = |q: &QubitRef| -> ParseResult<QubitRef> {
        arguments
            .get(q.register.as_str())
            .copied()
            .cloned()
            .ok_or_else(|| ParseError::UnknownRegister(q.register.clone()))
    };

    let mut out = Vec::new();
    for op in &def.body {
        match op {
            GateBodyOp::Gate(g) => {
                let instantiated = match g {
                    Gate::Cnot { ctrl, tgt, .. } => Gate::Cnot {
                        ctrl: resolve(ctrl)?,
                        tgt: resolve(tgt)?,
                        pos,
                    },
                    Gate::U {
                        theta,
                        phi,
                        lambda,
                        target,
                        ..
                    } => Gate::U {
                        theta: theta.subst(&bindings),
                        phi: phi.subst(&bindings),
                        lambda: lambda.subst(&bindings),
                        target: resolve(target)?,
                        pos,
                    },
                    Gate::Named {
                        name,
                        params,
                        qubits,
                        ..
                    } => Gate::Named {
                        name: name.clone(),
                        params: params.iter().map(|p| p.subst(&bindings)).collect(),
                        qubits: qubits
                            .iter()
                            .map(&resolve)
                            .collect::<ParseResult<Vec<_>>>()?,
                        pos,
                    },
                };
                out.extend(expand(&instantiated, defs, opaques, depth + 1)?);
            }
            GateBodyOp::Barrier(refs) => {
                let refs = refs
                    .iter()
                    .map(&resolve)
                    .collect::<ParseResult<Vec<_>>>()?;
                out.push(GateBodyOp::Barrier(refs));
            }
        }
    }
    Ok(out)
}

fn check_arity(
    name: &str,
    expected_params: usize,
    params: &[Expr],
    expected_qubits: usize,
    qubits: &[QubitRef],
) -> ParseResult<()> {
    if params.len() != expected_params {
        return Err(ParseError::WrongParameterCount {
            gate: name.to_string(),
            expected: expected_params,
            got: params.len(),
        });
    }
    if qubits.len() != expected_qubits {
        return Err(ParseError::WrongQubitCount {
            gate: name.to_string(),
            expected: expected_qubits,
            got: qubits.len(),
        });
    }
    Ok(())
}

/// The `qelib1.inc` definition of `name`, instantiated with `params` and
/// `qubits`. One level of expansion; results may reference other library
/// gates and are expanded recursively by the caller.
fn qelib_body(
    name: &str,
    params: &[Expr],
    qubits: &[QubitRef],
    pos: Position,
) -> ParseResult<Vec<Gate>> {
    let u = |theta: Expr, phi: Expr, lambda: Expr, target: &QubitRef| Gate::U {
        theta,
        phi,
        lambda,
        target: target.clone(),
        pos,
    };
    let cx = |ctrl: &QubitRef, tgt: &QubitRef| Gate::Cnot {
        ctrl: ctrl.clone(),
        tgt: tgt.clone(),
        pos,
    };
    let named = |name: &str, params: Vec<Expr>, qubits: Vec<&QubitRef>| Gate::Named {
        name: name.to_string(),
        params,
        qubits: qubits.into_iter().cloned().collect(),
        pos,
    };

    let (expected_params, expected_qubits) = match name {
        "u3" | "cu3" => (3, if name == "u3" { 1 } else { 2 }),
        "u2" => (2, 1),
        "u1" | "u0" | "rx" | "ry" | "rz" => (1, 1),
        "crz" | "cu1" => (1, 2),
        "cx" | "cz" | "cy" | "ch" | "swap" => (0, 2),
        "ccx" => (0, 3),
        "id" | "x" | "y" | "z" | "h" | "s" | "sdg" | "t" | "tdg" => (0, 1),
        _ => return Err(ParseError::UnknownGate(name.to_string())),
    };
    check_arity(name, expected_params, params, expected_qubits, qubits)?;

    let p = |i: usize| params[i].clone();
    let q = |i: usize| &qubits[i];
    let half = |e: Expr| Expr::div(e, Expr::Int(2));

    Ok(match name {
        "u3" => vec![u(p(0), p(1), p(2), q(0))],
        "u2" => vec![u(Expr::pi_over(2), p(0), p(1), q(0))],
        "u1" => vec![u(Expr::Int(0), Expr::Int(0), p(0), q(0))],
        "u0" => vec![u(Expr::Int(0), Expr::Int(0), Expr::Int(0), q(0))],
        "cx" => vec![cx(q(0), q(1))],
        "id" => vec![u(Expr::Int(0), Expr::Int(0), Expr::Int(0), q(0))],
        "x" => vec![named("u3", vec![Expr::Pi, Expr::Int(0), Expr::Pi], vec![q(0)])],
        "y" => vec![named(
            "u3",
            vec![Expr::Pi, Expr::pi_over(2), Expr::pi_over(2)],
            vec![q(0)],
        )],
        "z" => vec![named("u1", vec![Expr::Pi], vec![q(0)])],
        "h" => vec![named("u2", vec![Expr::Int(0), Expr::Pi], vec![q(0)])],
        "s" => vec![named("u1", vec![Expr::pi_over(2)], vec![q(0)])],
        "sdg" => vec![named("u1", vec![Expr::neg(Expr::pi_over(2))], vec![q(0)])],
        "t" => vec![named("u1", vec![Expr::pi_over(4)], vec![q(0)])],
        "tdg" => vec![named("u1", vec![Expr::neg(Expr::pi_over(4))], vec![q(0)])],
        "rx" => vec![named(
            "u3",
            vec![p(0), Expr::neg(Expr::pi_over(2)), Expr::pi_over(2)],
            vec![q(0)],
        )],
        "ry" => vec![named("u3", vec![p(0), Expr::Int(0), Expr::Int(0)], vec![q(0)])],
        "rz" => vec![named("u1", vec![p(0)], vec![q(0)])],
        "cz" => vec![
            named("h", vec![], vec![q(1)]),
            cx(q(0), q(1)),
            named("h", vec![], vec![q(1)]),
        ],
        "cy" => vec![
            named("sdg", vec![], vec![q(1)]),
            cx(q(0), q(1)),
            named("s", vec![], vec![q(1)]),
        ],
        "swap" => vec![cx(q(0), q(1)), cx(q(1), q(0)), cx(q(0), q(1))],
        "ch" => vec![
            named("h", vec![], vec![q(1)]),
            named("sdg", vec![], vec![q(1)]),
            cx(q(0), q(1)),
            named("h", vec![], vec![q(1)]),
            named("t", vec![], vec![q(1)]),
            cx(q(0), q(1)),
            named("t", vec![], vec![q(1)]),
            named("h", vec![], vec![q(1)]),
            named("s", vec![], vec![q(1)]),
            named("x", vec![], vec![q(1)]),
            named("s", vec![], vec![q(0)]),
        ],
        "ccx" => vec![
            named("h", vec![], vec![q(2)]),
            cx(q(1), q(2)),
            named("tdg", vec![], vec![q(2)]),
            cx(q(0), q(2)),
            named("t", vec![], vec![q(2)]),
            cx(q(1), q(2)),
            named("tdg", vec![], vec![q(2)]),
            cx(q(0), q(2)),
            named("t", vec![], vec![q(1)]),
            named("t", vec![], vec![q(2)]),
            named("h", vec![], vec![q(2)]),
            cx(q(0), q(1)),
            named("t", vec![], vec![q(0)]),
            named("tdg", vec![], vec![q(1)]),
            cx(q(0), q(1)),
        ],
        "crz" => vec![
            named("u1", vec![half(p(0))], vec![q(1)]),
            cx(q(0), q(1)),
            named("u1", vec![Expr::neg(half(p(0)))], vec![q(1)]),
            cx(q(0), q(1)),
        ],
        "cu1" => vec![
            named("u1", vec![half(p(0))], vec![q(0)]),
            cx(q(0), q(1)),
            named("u1", vec![Expr::neg(half(p(0)))], vec![q(1)]),
            cx(q(0), q(1)),
            named("u1", vec![half(p(0))], vec![q(1)]),
        ],
        "cu3" => vec![
            named("u1", vec![half(Expr::add(p(2), p(1)))], vec![q(0)]),
            named("u1", vec![half(Expr::sub(p(2), p(1)))], vec![q(1)]),
            cx(q(0), q(1)),
            named(
                "u3",
                vec![
                    Expr::neg(half(p(0))),
                    Expr::Int(0),
                    Expr::neg(half(Expr::add(p(1), p(2)))),
                ],
                vec![q(1)],
            ),
            cx(q(0), q(1)),
            named("u3", vec![half(p(0)), p(1), Expr::Int(0)], vec![q(1)]),
        ],
        _ => unreachable!("arity table covers every known gate"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use crate::parser::parse;

    fn prepare(source: &str) -> Program {
        let mut program = parse(source).unwrap();
        desugar(&mut program).unwrap();
        inline(&mut program).unwrap();
        program
    }

    fn only_primitives(program: &Program) -> bool {
        program.statements.iter().all(|s| {
            let gate = match s {
                Stmt::Gate(g) => Some(g),
                Stmt::If { body, .. } => match &**body {
                    Stmt::Gate(g) => Some(g),
                    _ => None,
                },
                _ => None,
            };
            !matches!(gate, Some(Gate::Named { .. }))
        })
    }

    #[test]
    fn test_inline_h() {
        let program = prepare(
            r"
            OPENQASM 2.0;
            qreg q[1];
            h q[0];
        ",
        );
        assert!(only_primitives(&program));

        match &program.statements[1] {
            Stmt::Gate(Gate::U { theta, phi, lambda, .. }) => {
                let pi = std::f64::consts::PI;
                assert!((theta.eval().unwrap() - pi / 2.0).abs() < 1e-12);
                assert!((phi.eval().unwrap()).abs() < 1e-12);
                assert!((lambda.eval().unwrap() - pi).abs() < 1e-12);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_inline_swap_to_three_cnots() {
        let program = prepare(
            r"
            OPENQASM 2.0;
            qreg q[2];
            swap q[0], q[1];
        ",
        );

        let cnots: Vec<_> = program
            .statements
            .iter()
            .filter_map(|s| match s {
                Stmt::Gate(Gate::Cnot { ctrl, tgt, .. }) => {
                    Some((ctrl.index.unwrap(), tgt.index.unwrap()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(cnots, vec![(0, 1), (1, 0), (0, 1)]);
    }

    #[test]
    fn test_inline_user_gate() {
        let program = prepare(
            r"
            OPENQASM 2.0;
            gate entangle a, b {
                h a;
                cx a, b;
            }
            qreg q[2];
            entangle q[0], q[1];
        ",
        );

        assert!(only_primitives(&program));
        // Declaration removed, expansion in place.
        assert!(!program
            .statements
            .iter()
            .any(|s| matches!(s, Stmt::GateDecl { .. })));
        assert!(matches!(
            program.statements.last(),
            Some(Stmt::Gate(Gate::Cnot { .. }))
        ));
    }

    #[test]
    fn test_inline_parameterized_user_gate() {
        let program = prepare(
            r"
            OPENQASM 2.0;
            gate twist(theta) a {
                rz(theta/2) a;
            }
            qreg q[1];
            twist(pi) q[0];
        ",
        );

        match &program.statements[1] {
            Stmt::Gate(Gate::U { lambda, .. }) => {
                assert!((lambda.eval().unwrap() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_inline_conditional_gate() {
        let program = prepare(
            r"
            OPENQASM 2.0;
            qreg q[1];
            creg c[1];
            if (c == 1) z q[0];
        ",
        );

        match &program.statements[2] {
            Stmt::If { body, .. } => assert!(matches!(**body, Stmt::Gate(Gate::U { .. }))),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_gate_rejected() {
        let source = r"
            OPENQASM 2.0;
            qreg q[1];
            frobnicate q[0];
        ";
        let mut program = parse(source).unwrap();
        desugar(&mut program).unwrap();
        let err = inline(&mut program).unwrap_err();
        assert!(matches!(err, ParseError::UnknownGate(name) if name == "frobnicate"));
    }

    #[test]
    fn test_opaque_application_rejected() {
        let source = r"
            OPENQASM 2.0;
            opaque magic a;
            qreg q[1];
            magic q[0];
        ";
        let mut program = parse(source).unwrap();
        desugar(&mut program).unwrap();
        let err = inline(&mut program).unwrap_err();
        assert!(matches!(err, ParseError::OpaqueGate(name) if name == "magic"));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        let source = r"
            OPENQASM 2.0;
            qreg q[2];
            h q[0], q[1];
        ";
        let mut program = parse(source).unwrap();
        desugar(&mut program).unwrap();
        let err = inline(&mut program).unwrap_err();
        assert!(matches!(err, ParseError::WrongQubitCount { .. }));
    }
}
