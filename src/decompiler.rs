//! Whole-program decompilation driver.
//!
//! [`Decompiler`] runs the analysis passes, type inference, per-subroutine reconstruction
//! and cleanup over a [`ParseTree`] and collects the results into a
//! [`DecompiledProgram`].
//!
//! # Pipeline
//!
//! 1. [`PositionResolver`] records the byte position of every instruction
//! 2. [`JumpResolver`] resolves jump and call destinations
//! 3. [`DeadCodeMarker`] marks unreachable instructions and short-circuit jumps
//! 4. [`CallGraph::build`] builds the call graph and its SCCs
//! 5. [`TypeInferenceEngine`] infers every prototype and the global slot types
//! 6. [`ControlFlowReconstructor`] rebuilds a [`ScriptTree`] per subroutine
//! 7. [`CleanupPass`] normalizes every tree
//! 8. Shared aggregates are registered and named across the program
//!
//! Steps 1 to 5 fail the whole run on malformed input. A subroutine that fails in step 6
//! is kept with its error and renders as a failure comment.
//!
//! # Examples
//!
//! ```rust,ignore
//! use ncsdecomp::prelude::*;
//!
//! let catalog = ActionTable::new()
//!     .with(1, ActionSignature::new("PrintString", Type::VOID, vec![Type::STRING]));
//! let decompiler = Decompiler::new(&catalog, DecompilerConfig::default());
//! let program = decompiler.decompile(&tree)?;
//! println!("{}", program.to_text());
//! ```

use std::{fmt::Write, sync::Arc};

use rayon::prelude::*;

use crate::{
    analysis::{CallGraph, DeadCodeMarker, JumpResolver, NodeAnalysisData, PositionResolver},
    bytecode::{ActionCatalog, ParseTree, SubId},
    cleanup::CleanupPass,
    config::DecompilerConfig,
    inference::{ProgramLayout, TypeInference, TypeInferenceEngine},
    reconstruct::{ControlFlowReconstructor, ReconstructContext},
    script::{Node, ScriptTree},
    types::{StructTable, Type},
    Error, Result,
};

/// Marker opening the comment that replaces a body which failed to reconstruct.
pub const DECOMPILE_FAILED: &str = "__decompile_failed";

/// Result of the analysis and inference steps.
#[derive(Debug)]
pub struct ProgramAnalysis {
    /// Per-instruction side table
    pub data: NodeAnalysisData,
    /// Call graph with SCCs
    pub graph: CallGraph,
    /// Entry, stub, globals and main subroutines
    pub layout: ProgramLayout,
    /// Prototypes and global types
    pub inference: TypeInference,
}

/// One reconstructed subroutine.
#[derive(Debug, Clone)]
pub struct DecompiledSubroutine {
    /// Subroutine in the parse tree
    pub sub: SubId,
    /// Source name
    pub name: String,
    /// Rendered prototype, without trailing semicolon
    pub prototype: String,
    /// The reconstructed tree, `None` when reconstruction failed
    pub tree: Option<ScriptTree>,
    /// Why reconstruction failed
    pub error: Option<Error>,
}

impl DecompiledSubroutine {
    /// `true` when the body could not be reconstructed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.tree.is_none()
    }

    /// Renders the subroutine, or its prototype around a failure comment.
    #[must_use]
    pub fn to_text(&self, indent: &str) -> String {
        match (&self.tree, &self.error) {
            (Some(tree), _) => tree.to_text(),
            (None, error) => format!(
                "{} {{\n{indent}/* {DECOMPILE_FAILED}: {} */\n}}\n",
                self.prototype,
                error
                    .as_ref()
                    .map_or_else(|| "unknown error".to_string(), ToString::to_string)
            ),
        }
    }
}

/// A decompiled script.
#[derive(Debug, Clone)]
pub struct DecompiledProgram {
    /// Every rendered function, in position order
    pub subroutines: Vec<DecompiledSubroutine>,
    /// The globals initializer, when the program has one
    pub globals: Option<DecompiledSubroutine>,
    /// Aggregate types named across the program
    pub structs: Arc<StructTable>,
    /// The script's main subroutine
    pub main: SubId,
    indent: String,
}

impl DecompiledProgram {
    /// Function by subroutine id.
    #[must_use]
    pub fn subroutine(&self, sub: SubId) -> Option<&DecompiledSubroutine> {
        self.subroutines.iter().find(|s| s.sub == sub)
    }

    /// Function by source name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&DecompiledSubroutine> {
        self.subroutines.iter().find(|s| s.name == name)
    }

    /// Number of functions whose body failed to reconstruct.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.subroutines
            .iter()
            .chain(self.globals.iter())
            .filter(|s| s.is_failed())
            .count()
    }

    /// Number of synthesized placeholders in the rendered program.
    ///
    /// Every failed body counts as one placeholder.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.subroutines
            .iter()
            .chain(self.globals.iter())
            .map(|s| s.tree.as_ref().map_or(1, ScriptTree::placeholder_count))
            .sum()
    }

    /// Renders the whole program.
    ///
    /// Sections appear in this order, separated by blank lines: shared struct
    /// definitions, global declarations, forward prototypes of every function except
    /// main, and the function bodies.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut sections: Vec<String> = Vec::new();

        let mut structs = String::new();
        for (name, ty) in self.structs.named() {
            let _ = writeln!(structs, "struct {name} {{");
            for (index, member) in ty.members().iter().enumerate() {
                let _ = writeln!(
                    structs,
                    "{}{} field{};",
                    self.indent,
                    self.structs.spell(member),
                    index + 1
                );
            }
            structs.push_str("};\n");
        }
        sections.push(structs);

        if let Some(globals) = &self.globals {
            let text = match (&globals.tree, &globals.error) {
                (Some(tree), _) => tree.to_text(),
                (None, error) => format!(
                    "/* {DECOMPILE_FAILED}: {} */\n",
                    error
                        .as_ref()
                        .map_or_else(|| "unknown error".to_string(), ToString::to_string)
                ),
            };
            sections.push(text);
        }

        let mut prototypes = String::new();
        for sub in self.subroutines.iter().filter(|s| s.sub != self.main) {
            let _ = writeln!(prototypes, "{};", sub.prototype);
        }
        sections.push(prototypes);

        let bodies: Vec<String> = self
            .subroutines
            .iter()
            .map(|s| s.to_text(&self.indent))
            .collect();
        sections.push(bodies.join("\n"));

        sections.retain(|s| !s.is_empty());
        sections.join("\n")
    }
}

/// Decompiles NCS parse trees.
pub struct Decompiler<'a> {
    catalog: &'a dyn ActionCatalog,
    config: DecompilerConfig,
}

impl<'a> Decompiler<'a> {
    /// Creates a decompiler using `catalog` for engine action signatures.
    #[must_use]
    pub fn new(catalog: &'a dyn ActionCatalog, config: DecompilerConfig) -> Self {
        Decompiler { catalog, config }
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &DecompilerConfig {
        &self.config
    }

    /// Runs the analysis passes and type inference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JumpTarget`] for a jump into the middle of an instruction and
    /// [`Error::Malformed`] for a tree whose positions are inconsistent or that has no
    /// subroutines.
    pub fn analyze(&self, tree: &ParseTree) -> Result<ProgramAnalysis> {
        let mut data = NodeAnalysisData::new(tree.command_count());
        PositionResolver::resolve(tree, &mut data)?;
        JumpResolver::resolve(tree, &mut data)?;
        DeadCodeMarker::mark(tree, &mut data)?;

        let graph = CallGraph::build(tree, &data)?;
        if log::log_enabled!(log::Level::Debug) {
            let stats = graph.stats();
            log::debug!(
                "call graph: {} subroutines, {} calls, {} components with {} edges, {} recursive",
                stats.subroutine_count,
                stats.edge_count,
                stats.scc_count,
                stats.condensed_edge_count,
                stats.recursive_count
            );
        }
        let layout = ProgramLayout::detect(tree, &data, &graph)?;
        let inference =
            TypeInferenceEngine::new(tree, &graph, self.catalog, &self.config).run(&mut data, &layout)?;

        Ok(ProgramAnalysis {
            data,
            graph,
            layout,
            inference,
        })
    }

    /// Decompiles a whole program.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Decompiler::analyze`]. Failures while rebuilding single
    /// subroutines are recorded in [`DecompiledSubroutine::error`] instead.
    pub fn decompile(&self, tree: &ParseTree) -> Result<DecompiledProgram> {
        let analysis = self.analyze(tree)?;
        let names = Self::names(tree, &analysis);
        let ctx = ReconstructContext {
            tree,
            data: &analysis.data,
            graph: &analysis.graph,
            catalog: self.catalog,
            states: &analysis.inference.states,
            globals: &analysis.inference.globals,
            layout: &analysis.layout,
            names: &names,
            config: &self.config,
        };
        let reconstructor = ControlFlowReconstructor::new(ctx);

        let layout = analysis.layout;
        let subs: Vec<SubId> = tree
            .subroutines()
            .filter(|sub| Some(*sub) != layout.stub)
            .collect();
        let build = |sub: &SubId| -> (SubId, Result<ScriptTree>) {
            let result = reconstructor.reconstruct(*sub).map(|mut script| {
                CleanupPass::new().run(&mut script);
                script
            });
            (*sub, result)
        };
        let results: Vec<(SubId, Result<ScriptTree>)> = if self.config.parallel {
            subs.par_iter().map(build).collect()
        } else {
            subs.iter().map(build).collect()
        };

        let mut table = StructTable::new();
        for (_, result) in &results {
            if let Ok(script) = result {
                Self::register_structs(&mut table, script);
            }
        }
        let structs = Arc::new(table);

        let mut globals = None;
        let mut subroutines = Vec::with_capacity(results.len());
        for (sub, result) in results {
            let (mut script, error) = match result {
                Ok(script) => (script, None),
                Err(error) => {
                    log::debug!("{}: reconstruction failed: {error}", names[sub.index()]);
                    (reconstructor.skeleton(sub), Some(error))
                }
            };
            script.structs = Arc::clone(&structs);
            let decompiled = DecompiledSubroutine {
                sub,
                name: names[sub.index()].clone(),
                prototype: script.prototype(),
                tree: if error.is_none() { Some(script) } else { None },
                error,
            };
            if Some(sub) == layout.globals {
                globals = Some(decompiled);
            } else if layout.is_function(sub) {
                subroutines.push(decompiled);
            }
        }

        let program = DecompiledProgram {
            subroutines,
            globals,
            structs,
            main: layout.main,
            indent: self.config.indent.clone(),
        };
        log::debug!(
            "decompiled {} functions, {} failed, {} placeholders",
            program.subroutines.len(),
            program.failure_count(),
            program.placeholder_count()
        );
        Ok(program)
    }

    /// Source name of every subroutine, indexed by [`SubId`].
    ///
    /// Main is `StartingConditional` when it returns `int`, the loader roles get reserved
    /// names, and every other subroutine is numbered `subN` in position order.
    fn names(tree: &ParseTree, analysis: &ProgramAnalysis) -> Vec<String> {
        let layout = &analysis.layout;
        let mut counter = 0;
        tree.subroutines()
            .map(|sub| {
                if sub == layout.main {
                    let returns = analysis
                        .inference
                        .state(sub)
                        .map_or(Type::VOID, |s| s.return_type.clone());
                    if returns == Type::INT {
                        "StartingConditional".to_string()
                    } else {
                        "main".to_string()
                    }
                } else if Some(sub) == layout.globals {
                    "__globals".to_string()
                } else if Some(sub) == layout.stub {
                    "__entry".to_string()
                } else {
                    counter += 1;
                    format!("sub{counter}")
                }
            })
            .collect()
    }

    /// Records the aggregate types a tree declares or passes.
    fn register_structs(table: &mut StructTable, script: &ScriptTree) {
        table.register(&script.signature.return_type);
        for param in &script.signature.params {
            if let Some(var) = script.vars.get(*param) {
                table.register(&var.ty);
            }
        }
        for id in script.walk() {
            if let Node::VarDecl { var, .. } = script.node(id) {
                if let Some(var) = script.vars.get(*var) {
                    table.register(&var.ty);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{Constant, Instruction, Opcode, ParseTreeBuilder, TypeCode},
        test::catalog,
    };

    fn hello() -> ParseTree {
        let mut b = ParseTreeBuilder::new();
        b.subroutine()
            .emit(Instruction::constant(Constant::String("hello".into())))
            .emit(Instruction::action(1, 1))
            .simple(Opcode::Retn);
        b.finish().unwrap()
    }

    #[test]
    fn test_single_function_program() {
        let catalog = catalog();
        let program = Decompiler::new(&catalog, DecompilerConfig::default())
            .decompile(&hello())
            .unwrap();
        assert_eq!(program.subroutines.len(), 1);
        assert_eq!(program.placeholder_count(), 0);
        assert_eq!(
            program.to_text(),
            "void main() {\n    PrintString(\"hello\");\n}\n"
        );
    }

    #[test]
    fn test_starting_conditional_name() {
        // int StartingConditional() { return Random(2); }
        let mut b = ParseTreeBuilder::new();
        let main = b.label();
        b.subroutine()
            .emit(Instruction::rsadd(TypeCode::Int))
            .jsr(main)
            .simple(Opcode::Retn);
        b.subroutine_at(main)
            .emit(Instruction::constant(Constant::Int(2)))
            .emit(Instruction::action(0, 1))
            .emit(Instruction::cpdownsp(-8, 4))
            .emit(Instruction::movsp(-4))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();

        let catalog = catalog();
        let program = Decompiler::new(&catalog, DecompilerConfig::literal())
            .decompile(&tree)
            .unwrap();
        assert_eq!(program.subroutines.len(), 1);
        assert_eq!(program.subroutines[0].name, "StartingConditional");
        assert_eq!(
            program.to_text(),
            "int StartingConditional() {\n    return Random(2);\n}\n"
        );
    }

    #[test]
    fn test_failed_body_renders_comment() {
        let failed = DecompiledSubroutine {
            sub: SubId::new(1),
            name: "sub1".into(),
            prototype: "void sub1()".into(),
            tree: None,
            error: Some(Error::StructNesting { position: 40 }),
        };
        assert!(failed.is_failed());
        assert_eq!(
            failed.to_text("    "),
            "void sub1() {\n    /* __decompile_failed: Struct nested beyond one level at position 40 */\n}\n"
        );
    }

    #[test]
    fn test_analysis_rejects_unordered_positions() {
        let catalog = catalog();
        let tree = ParseTree::from_subroutines(vec![
            vec![(20, Instruction::simple(Opcode::Retn, TypeCode::Void))],
            vec![(20, Instruction::simple(Opcode::Retn, TypeCode::Void))],
        ])
        .unwrap();
        let result = Decompiler::new(&catalog, DecompilerConfig::default()).analyze(&tree);
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }
}
