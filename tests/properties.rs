//! Property tests over generated structured programs.
//!
//! Programs are built from a small statement grammar (prints, `if`, `if`/`else` and
//! `while`) and lowered the way the compiler lowers them. Every generated program must
//! analyze, type and reconstruct without placeholders. Two further generators cover
//! straight-line stack traffic and random (often recursive) call graphs.

mod common;

use common::{catalog, print, random};
use ncsdecomp::{analysis::stack_effect, prelude::*};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Stmt {
    Print(u8),
    If(Vec<Stmt>),
    IfElse(Vec<Stmt>, Vec<Stmt>),
    While(Vec<Stmt>),
}

fn stmt() -> impl Strategy<Value = Stmt> {
    let leaf = any::<u8>().prop_map(Stmt::Print);
    leaf.prop_recursive(3, 24, 3, |inner| {
        let body = prop::collection::vec(inner, 1..3);
        prop_oneof![
            body.clone().prop_map(Stmt::If),
            (body.clone(), body.clone()).prop_map(|(a, b)| Stmt::IfElse(a, b)),
            body.prop_map(Stmt::While),
        ]
    })
}

fn program() -> impl Strategy<Value = Vec<Stmt>> {
    prop::collection::vec(stmt(), 1..5)
}

fn lower(b: &mut ParseTreeBuilder, stmts: &[Stmt], printed: &mut Vec<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Print(n) => {
                let text = format!("s{n}");
                print(b, &text);
                printed.push(text);
            }
            Stmt::If(body) => {
                let end = b.label();
                random(b);
                b.jz(end);
                lower(b, body, printed);
                b.place(end);
            }
            Stmt::IfElse(then, other) => {
                let (otherwise, end) = (b.label(), b.label());
                random(b);
                b.jz(otherwise);
                lower(b, then, printed);
                b.jmp(end).place(otherwise);
                lower(b, other, printed);
                b.place(end);
            }
            Stmt::While(body) => {
                let (top, end) = (b.label(), b.label());
                b.place(top);
                random(b);
                b.jz(end);
                lower(b, body, printed);
                b.jmp(top).place(end);
            }
        }
    }
}

/// Lowers `stmts` into `void main()`, followed by a final print so no jump targets the
/// closing `RETN`.
fn assemble(stmts: &[Stmt]) -> (ParseTree, Vec<String>) {
    let mut b = ParseTreeBuilder::new();
    let mut printed = Vec::new();
    b.subroutine();
    lower(&mut b, stmts, &mut printed);
    print(&mut b, "end");
    printed.push("end".to_string());
    b.simple(Opcode::Retn);
    (b.finish().expect("labels are placed"), printed)
}

/// Straight-line integer stack traffic in `main`. Each byte picks an operation; operations
/// the current stack height cannot support are skipped. The remaining slots are popped
/// before `RETN`. A call goes to `void sub1(int n) { -n; }`, appended only when used.
fn straight_line(ops: &[u8]) -> ParseTree {
    let mut b = ParseTreeBuilder::new();
    let callee = b.label();
    let mut calls = false;
    b.subroutine()
        .emit(Instruction::constant(Constant::Int(1)));
    let mut height = 1;
    for op in ops {
        match (op % 12, height) {
            (0, _) => {
                b.emit(Instruction::constant(Constant::Int(i32::from(*op))));
                height += 1;
            }
            (1, h) if h >= 1 => {
                b.emit(Instruction::cptopsp(-4, 4));
                height += 1;
            }
            (2, h) if h >= 2 => {
                b.emit(Instruction::simple(Opcode::Add, TypeCode::IntInt));
                height -= 1;
            }
            (3, h) if h >= 1 => {
                b.emit(Instruction::simple(Opcode::Neg, TypeCode::Int));
            }
            (4, h) if h >= 1 => {
                b.emit(Instruction::action(0, 1));
            }
            (5, h) if h >= 2 => {
                b.emit(Instruction::movsp(-4));
                height -= 1;
            }
            (6, _) => {
                b.emit(Instruction::rsadd(TypeCode::Int));
                height += 1;
            }
            (7, h) if h >= 2 => {
                b.emit(Instruction::cpdownsp(-8, 4));
            }
            (8, h) if h >= 2 => {
                b.emit(Instruction::destruct(8, 0, 4));
                height -= 1;
            }
            (9, h) if h >= 2 => {
                let opcode = if op % 24 < 12 { Opcode::Equal } else { Opcode::LogAnd };
                b.emit(Instruction::simple(opcode, TypeCode::IntInt));
                height -= 1;
            }
            (10, h) if h >= 1 => {
                let opcode = if op % 24 < 12 { Opcode::IncISp } else { Opcode::DecISp };
                b.emit(Instruction::step(opcode, -4));
            }
            (11, h) if h >= 1 => {
                b.jsr(callee);
                calls = true;
                height -= 1;
            }
            _ => {}
        }
    }
    b.emit(Instruction::movsp(-4 * height)).simple(Opcode::Retn);
    if calls {
        b.subroutine_at(callee)
            .emit(Instruction::cptopsp(-4, 4))
            .emit(Instruction::simple(Opcode::Neg, TypeCode::Int))
            .emit(Instruction::movsp(-4))
            .emit(Instruction::movsp(-4))
            .simple(Opcode::Retn);
    }
    b.finish().expect("labels are placed")
}

/// One void subroutine per entry of `calls`; subroutine `i` conditionally calls each entry
/// of `calls[i]`.
/// `main` prints once and then calls every subroutine.
fn call_graph(calls: &[Vec<usize>]) -> ParseTree {
    let mut b = ParseTreeBuilder::new();
    let labels: Vec<Label> = calls.iter().map(|_| b.label()).collect();
    b.subroutine();
    print(&mut b, "main");
    for label in &labels {
        b.jsr(*label);
    }
    b.simple(Opcode::Retn);

    for (label, callees) in labels.iter().zip(calls) {
        b.subroutine_at(*label);
        for callee in callees {
            let skip = b.label();
            random(&mut b);
            b.jz(skip).jsr(labels[callee % labels.len()]).place(skip);
        }
        print(&mut b, "body");
        b.simple(Opcode::Retn);
    }
    b.finish().expect("labels are placed")
}

proptest! {
    #[test]
    fn test_snapshots_follow_declared_effects(ops in prop::collection::vec(any::<u8>(), 0..40)) {
        let tree = straight_line(&ops);
        let catalog = catalog();
        let analysis = Decompiler::new(&catalog, DecompilerConfig::default())
            .analyze(&tree)
            .expect("analysis succeeds");

        let mut height: i64 = 0;
        for &cmd in tree.children(analysis.layout.main) {
            if let Some(snapshot) = analysis.data.stack(cmd) {
                prop_assert_eq!(i64::from(snapshot.height), height);
            }
            let callee_params = (tree.kind(cmd) == Opcode::Jsr).then_some(1);
            let effect = stack_effect(tree.instruction(cmd), &catalog, callee_params)
                .expect("effect is known");
            height += effect.net();
            prop_assert!(height >= 0);
        }
        prop_assert_eq!(height, 0);
    }

    #[test]
    fn test_recursive_call_graphs_converge(
        calls in prop::collection::vec(prop::collection::vec(0usize..8, 0..3), 1..6)
    ) {
        let tree = call_graph(&calls);
        let catalog = catalog();
        let analysis = Decompiler::new(&catalog, DecompilerConfig::default())
            .analyze(&tree)
            .expect("analysis succeeds");

        prop_assert!(analysis.inference.failures.is_empty());
        for index in 0..=calls.len() {
            let state = analysis.inference.state(SubId::new(index)).expect("prototype");
            prop_assert!(state.is_prototyped());
            prop_assert!(state.params.is_empty());
            prop_assert_eq!(&state.return_type, &Type::VOID);
        }
    }

    #[test]
    fn test_every_jump_resolves(stmts in program()) {
        let (tree, _) = assemble(&stmts);
        let catalog = catalog();
        let analysis = Decompiler::new(&catalog, DecompilerConfig::default())
            .analyze(&tree)
            .expect("analysis succeeds");
        for cmd in tree.commands() {
            let kind = tree.kind(cmd);
            if matches!(kind, Opcode::Jmp | Opcode::Jz | Opcode::Jnz | Opcode::Jsr) {
                prop_assert!(analysis.data.destination(cmd).expect("visited").is_some());
            }
        }
    }

    #[test]
    fn test_inference_terminates_with_balanced_stack(stmts in program()) {
        let (tree, _) = assemble(&stmts);
        let catalog = catalog();
        let analysis = Decompiler::new(&catalog, DecompilerConfig::default())
            .analyze(&tree)
            .expect("analysis succeeds");

        let main = analysis.inference.state(analysis.layout.main).expect("prototype");
        prop_assert!(main.is_prototyped());
        prop_assert!(main.params.is_empty());
        prop_assert!(analysis.inference.failures.is_empty());

        for cmd in tree.commands() {
            if tree.kind(cmd) == Opcode::Retn {
                if let Some(snapshot) = analysis.data.stack(cmd) {
                    prop_assert_eq!(snapshot.height, 0);
                }
            }
        }
    }

    #[test]
    fn test_reconstruction_keeps_every_statement(stmts in program()) {
        let (tree, printed) = assemble(&stmts);
        let program = common::decompile(&tree).expect("decompiles");
        prop_assert_eq!(program.failure_count(), 0);
        prop_assert_eq!(program.placeholder_count(), 0);

        let text = program.to_text();
        let mut rest = text.as_str();
        for expected in &printed {
            let call = format!("PrintString(\"{expected}\");");
            let found = rest.find(&call);
            prop_assert!(found.is_some(), "missing {} in\n{}", call, text);
            if let Some(at) = found {
                rest = &rest[at + call.len()..];
            }
        }
    }

    #[test]
    fn test_cleanup_is_idempotent(stmts in program()) {
        let (tree, _) = assemble(&stmts);
        let program = common::decompile(&tree).expect("decompiles");
        let pass = CleanupPass::new();
        for sub in &program.subroutines {
            if let Some(script) = &sub.tree {
                let mut again = script.clone();
                prop_assert_eq!(pass.run(&mut again), 0);
                prop_assert_eq!(again.to_text(), script.to_text());
            }
        }
    }
}
