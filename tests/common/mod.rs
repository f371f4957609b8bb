//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ncsdecomp::prelude::*;

/// A small engine action catalog using the stock NWScript ids.
pub fn catalog() -> ActionTable {
    ActionTable::new()
        .with(0, ActionSignature::new("Random", Type::INT, vec![Type::INT]))
        .with(
            1,
            ActionSignature::new("PrintString", Type::VOID, vec![Type::STRING]),
        )
        .with(
            7,
            ActionSignature::new("DelayCommand", Type::VOID, vec![Type::FLOAT, Type::ACTION]),
        )
        .with(
            27,
            ActionSignature::new("GetPosition", Type::VECTOR, vec![Type::OBJECT]),
        )
        .with(
            39,
            ActionSignature::new("SpeakString", Type::VOID, vec![Type::STRING, Type::INT])
                .with_defaults(&["0"]),
        )
        .with(
            92,
            ActionSignature::new("IntToString", Type::STRING, vec![Type::INT]),
        )
        .with(
            168,
            ActionSignature::new("GetTag", Type::STRING, vec![Type::OBJECT]),
        )
}

/// Emits `PrintString("<text>");`.
pub fn print(b: &mut ParseTreeBuilder, text: &str) {
    b.emit(Instruction::constant(Constant::String(text.into())))
        .emit(Instruction::action(1, 1));
}

/// Emits `Random(2)`, leaving its result on the stack.
pub fn random(b: &mut ParseTreeBuilder) {
    b.emit(Instruction::constant(Constant::Int(2)))
        .emit(Instruction::action(0, 1));
}

/// Decompiles `tree` with the default configuration.
pub fn decompile(tree: &ParseTree) -> Result<DecompiledProgram> {
    decompile_with(tree, DecompilerConfig::default())
}

/// Decompiles `tree` with `config`.
pub fn decompile_with(tree: &ParseTree, config: DecompilerConfig) -> Result<DecompiledProgram> {
    let catalog = catalog();
    Decompiler::new(&catalog, config).decompile(tree)
}
