use crate::{
    analysis::{DeadCodeMarker, JumpResolver, NodeAnalysisData, PositionResolver},
    bytecode::{ActionSignature, ActionTable, ParseTree},
    types::Type,
};

// Helper function to run the position, jump and liveness passes over a tree
pub fn marked(tree: &ParseTree) -> NodeAnalysisData {
    let mut data = NodeAnalysisData::new(tree.command_count());
    PositionResolver::resolve(tree, &mut data).unwrap();
    JumpResolver::resolve(tree, &mut data).unwrap();
    DeadCodeMarker::mark(tree, &mut data).unwrap();
    data
}

// Helper function to create a small engine action catalog
//
// Ids follow the stock NWScript table for the few actions used by the tests.
pub fn catalog() -> ActionTable {
    ActionTable::new()
        .with(
            0,
            ActionSignature::new("Random", Type::INT, vec![Type::INT]),
        )
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
            ActionSignature::new(
                "SpeakString",
                Type::VOID,
                vec![Type::STRING, Type::INT],
            )
            .with_defaults(&["0"]),
        )
        .with(
            168,
            ActionSignature::new("GetTag", Type::STRING, vec![Type::OBJECT]),
        )
}
