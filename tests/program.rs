//! Whole-program features: globals, closures, vectors, recursion and fallback prototypes.

mod common;

use common::{catalog, decompile, decompile_with, print};
use ncsdecomp::prelude::*;

#[test]
fn test_globals_render_before_functions() -> Result<()> {
    // int g = 5; void main() { PrintString(IntToString(g)); }
    let mut b = ParseTreeBuilder::new();
    let (globals, main) = (b.label(), b.label());
    b.subroutine().jsr(globals).simple(Opcode::Retn);
    b.subroutine_at(globals)
        .emit(Instruction::rsadd(TypeCode::Int))
        .emit(Instruction::constant(Constant::Int(5)))
        .emit(Instruction::cpdownsp(-8, 4))
        .emit(Instruction::movsp(-4))
        .simple(Opcode::SaveBp)
        .jsr(main)
        .simple(Opcode::RestoreBp)
        .emit(Instruction::movsp(-4))
        .simple(Opcode::Retn);
    b.subroutine_at(main)
        .emit(Instruction::cptopbp(-4, 4))
        .emit(Instruction::action(92, 1))
        .emit(Instruction::action(1, 1))
        .simple(Opcode::Retn);
    let tree = b.finish()?;

    let program = decompile(&tree)?;
    assert_eq!(program.subroutines.len(), 1);
    assert_eq!(program.subroutines[0].name, "main");
    let globals = program.globals.as_ref().expect("globals initializer");
    assert_eq!(
        globals.tree.as_ref().map(ScriptTree::to_text).as_deref(),
        Some("int intGlobal1 = 5;\n")
    );
    assert_eq!(
        program.to_text(),
        "int intGlobal1 = 5;\n\nvoid main() {\n    PrintString(IntToString(intGlobal1));\n}\n"
    );
    Ok(())
}

#[test]
fn test_delayed_action_closure() -> Result<()> {
    // DelayCommand(1.0, PrintString("later"));
    let mut b = ParseTreeBuilder::new();
    let after = b.label();
    b.subroutine()
        .emit(Instruction::store_state(0, 0))
        .jmp(after);
    print(&mut b, "later");
    b.simple(Opcode::Retn)
        .place(after)
        .emit(Instruction::constant(Constant::Float(1.0)))
        .emit(Instruction::action(7, 2))
        .simple(Opcode::Retn);

    let program = decompile(&b.finish()?)?;
    assert_eq!(
        program.to_text(),
        "void main() {\n    DelayCommand(1.0, PrintString(\"later\"));\n}\n"
    );
    Ok(())
}

#[test]
fn test_vector_member_read() -> Result<()> {
    // float f = GetPosition(OBJECT_SELF).y;
    let mut b = ParseTreeBuilder::new();
    b.subroutine()
        .emit(Instruction::rsadd(TypeCode::Float))
        .emit(Instruction::constant(Constant::Object(0)))
        .emit(Instruction::action(27, 1))
        .emit(Instruction::destruct(12, 4, 4))
        .emit(Instruction::cpdownsp(-8, 4))
        .emit(Instruction::movsp(-4))
        .emit(Instruction::movsp(-4))
        .simple(Opcode::Retn);

    let program = decompile(&b.finish()?)?;
    assert_eq!(
        program.to_text(),
        "void main() {\n    float float1 = GetPosition(OBJECT_SELF).y;\n}\n"
    );
    Ok(())
}

#[test]
fn test_default_arguments() -> Result<()> {
    let mut b = ParseTreeBuilder::new();
    b.subroutine()
        .emit(Instruction::constant(Constant::Int(0)))
        .emit(Instruction::constant(Constant::String("hi".into())))
        .emit(Instruction::action(39, 2))
        .simple(Opcode::Retn);
    let tree = b.finish()?;

    assert_eq!(
        decompile(&tree)?.to_text(),
        "void main() {\n    SpeakString(\"hi\");\n}\n"
    );
    assert_eq!(
        decompile_with(&tree, DecompilerConfig::literal())?.to_text(),
        "void main() {\n    SpeakString(\"hi\", 0);\n}\n"
    );
    Ok(())
}

fn mutual_recursion() -> Result<ParseTree> {
    // int even(int n) { if (n) return odd(n - 1); return 1; }  and odd symmetric
    let mut b = ParseTreeBuilder::new();
    let (even, odd) = (b.label(), b.label());
    b.subroutine()
        .emit(Instruction::rsadd(TypeCode::Int))
        .emit(Instruction::constant(Constant::Int(4)))
        .jsr(even)
        .emit(Instruction::movsp(-4))
        .simple(Opcode::Retn);

    for (label, other) in [(even, odd), (odd, even)] {
        let (base, epilogue) = (b.label(), b.label());
        b.subroutine_at(label)
            .emit(Instruction::cptopsp(-4, 4))
            .jz(base)
            .emit(Instruction::rsadd(TypeCode::Int))
            .emit(Instruction::cptopsp(-8, 4))
            .emit(Instruction::constant(Constant::Int(1)))
            .emit(Instruction::simple(Opcode::Sub, TypeCode::IntInt))
            .jsr(other)
            .emit(Instruction::cpdownsp(-12, 4))
            .emit(Instruction::movsp(-4))
            .jmp(epilogue)
            .place(base)
            .emit(Instruction::constant(Constant::Int(1)))
            .emit(Instruction::cpdownsp(-12, 4))
            .emit(Instruction::movsp(-4))
            .place(epilogue)
            .emit(Instruction::movsp(-4))
            .simple(Opcode::Retn);
    }
    b.finish()
}

#[test]
fn test_mutual_recursion_prototypes() -> Result<()> {
    let tree = mutual_recursion()?;
    let catalog = catalog();
    let decompiler = Decompiler::new(&catalog, DecompilerConfig::default());

    let analysis = decompiler.analyze(&tree)?;
    assert!(analysis.graph.has_recursion());
    let stats = analysis.graph.stats();
    assert_eq!(stats.scc_count, 2);
    assert_eq!(stats.condensed_edge_count, 1);
    assert_eq!(stats.recursive_count, 2);
    for sub in [SubId::new(1), SubId::new(2)] {
        let state = analysis.inference.state(sub).expect("prototype");
        assert!(state.flags.contains(SubroutineFlags::RECURSIVE));
        assert_eq!(state.params, vec![Type::INT]);
        assert_eq!(state.return_type, Type::INT);
    }

    let program = decompiler.decompile(&tree)?;
    assert_eq!(program.subroutines.len(), 3);
    assert!(program
        .to_text()
        .contains("int sub1(int intParam1);\nint sub2(int intParam1);\n"));
    Ok(())
}

#[test]
fn test_fallback_prototype_when_decisions_run_out() -> Result<()> {
    // void main() { PrintString("x"); ignore("hi"); }   void ignore(string s) { }
    let mut b = ParseTreeBuilder::new();
    let ignore = b.label();
    b.subroutine();
    print(&mut b, "x");
    b.emit(Instruction::constant(Constant::String("hi".into())))
        .jsr(ignore)
        .simple(Opcode::Retn);
    b.subroutine_at(ignore)
        .emit(Instruction::movsp(-4))
        .simple(Opcode::Retn);
    let tree = b.finish()?;

    let catalog = catalog();
    let config = DecompilerConfig::default().with_max_decisions(0);
    let decompiler = Decompiler::new(&catalog, config);

    let analysis = decompiler.analyze(&tree)?;
    assert!(!analysis.inference.failures.is_empty());
    assert!(analysis.inference.fallback_count() >= 1);
    let ignore = analysis.inference.state(SubId::new(1)).expect("prototype");
    assert!(ignore.is_prototyped());
    assert_eq!(ignore.param_slot_count(), 1);

    let program = decompiler.decompile(&tree)?;
    assert_eq!(program.subroutines.len(), 2);
    let fallback = program.by_name("sub1").expect("sub1 is rendered");
    assert_eq!(fallback.prototype, "void sub1(__invalid __unresolved_param0)");
    assert!(program.placeholder_count() >= 1);
    Ok(())
}

#[test]
fn test_parameters_numbered_in_declaration_order() -> Result<()> {
    // int sub(int a, int b) { return a - b; }   PrintString(IntToString(sub(5, 3)));
    let mut b = ParseTreeBuilder::new();
    let sub = b.label();
    b.subroutine()
        .emit(Instruction::rsadd(TypeCode::Int))
        .emit(Instruction::constant(Constant::Int(3)))
        .emit(Instruction::constant(Constant::Int(5)))
        .jsr(sub)
        .emit(Instruction::action(92, 1))
        .emit(Instruction::action(1, 1))
        .simple(Opcode::Retn);
    b.subroutine_at(sub)
        .emit(Instruction::cptopsp(-4, 4))
        .emit(Instruction::cptopsp(-12, 4))
        .emit(Instruction::simple(Opcode::Sub, TypeCode::IntInt))
        .emit(Instruction::cpdownsp(-16, 4))
        .emit(Instruction::movsp(-4))
        .emit(Instruction::movsp(-8))
        .simple(Opcode::Retn);

    let program = decompile(&b.finish()?)?;
    let sub = program.by_name("sub1").expect("sub1 is rendered");
    assert_eq!(sub.prototype, "int sub1(int intParam1, int intParam2)");
    assert_eq!(
        program.to_text(),
        "int sub1(int intParam1, int intParam2);\n\nvoid main() {\n    PrintString(IntToString(sub1(5, 3)));\n}\n\nint sub1(int intParam1, int intParam2) {\n    return intParam1 - intParam2;\n}\n"
    );
    Ok(())
}

#[test]
fn test_fallback_declaration_matches_call_site() -> Result<()> {
    // The caller pushes nothing for a subroutine that pops two slots.
    let mut b = ParseTreeBuilder::new();
    let ignore = b.label();
    b.subroutine();
    print(&mut b, "x");
    b.jsr(ignore).simple(Opcode::Retn);
    b.subroutine_at(ignore)
        .emit(Instruction::movsp(-8))
        .simple(Opcode::Retn);

    let config = DecompilerConfig::default().with_max_decisions(0);
    let program = decompile_with(&b.finish()?, config)?;
    let fallback = program.by_name("sub1").expect("sub1 is rendered");
    assert_eq!(
        fallback.prototype,
        "void sub1(__invalid __unresolved_param0, __invalid __unresolved_param1)"
    );
    assert!(program
        .to_text()
        .contains("    sub1(__unresolved_param0, __unresolved_param1);\n"));
    Ok(())
}

#[test]
fn test_missing_operand_renders_placeholder() -> Result<()> {
    // PrintString with nothing pushed for its argument
    let mut b = ParseTreeBuilder::new();
    b.subroutine()
        .emit(Instruction::action(1, 1))
        .simple(Opcode::Retn);

    let config = DecompilerConfig::default().with_max_decisions(0);
    let program = decompile_with(&b.finish()?, config)?;
    assert_eq!(program.failure_count(), 0);
    assert_eq!(
        program.to_text(),
        "void main() {\n    PrintString(__unknown_operand);\n}\n"
    );
    assert_eq!(program.placeholder_count(), 1);
    Ok(())
}

#[test]
fn test_strict_mode_keeps_fallback_output() -> Result<()> {
    let mut b = ParseTreeBuilder::new();
    let ignore = b.label();
    b.subroutine();
    print(&mut b, "x");
    b.emit(Instruction::constant(Constant::String("hi".into())))
        .jsr(ignore)
        .simple(Opcode::Retn);
    b.subroutine_at(ignore)
        .emit(Instruction::movsp(-4))
        .simple(Opcode::Retn);
    let tree = b.finish()?;

    let catalog = catalog();
    let lenient = Decompiler::new(&catalog, DecompilerConfig::default().with_max_decisions(0));
    let strict = Decompiler::new(
        &catalog,
        DecompilerConfig::default()
            .with_max_decisions(0)
            .with_strict(true),
    );

    let lenient_analysis = lenient.analyze(&tree)?;
    let strict_analysis = strict.analyze(&tree)?;
    assert_eq!(
        strict_analysis.inference.fallback_count(),
        lenient_analysis.inference.fallback_count()
    );
    let state = strict_analysis.inference.state(SubId::new(1)).expect("prototype");
    assert!(state.flags.contains(SubroutineFlags::FALLBACK));

    assert_eq!(strict.decompile(&tree)?.to_text(), lenient.decompile(&tree)?.to_text());
    Ok(())
}
