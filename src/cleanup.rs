//! Script tree normalization.
//!
//! [`CleanupPass`] runs once per reconstructed subroutine and rewrites a few shapes the
//! reconstructor leaves behind into the way a script author would have written them.
//!
//! # Example
//!
//! Before:
//! ```text
//! {
//!     int int1;
//!     int1 = 5;
//! }
//! ```
//!
//! After:
//! ```text
//! int int1 = 5;
//! ```
//!
//! # Rules
//!
//! Applied to every statement list, parents before children:
//!
//! 1. A body consisting of exactly one nested block absorbs the block's statements
//! 2. Consecutive declarations of every member of one aggregate become one declaration of
//!    the aggregate
//! 3. A declaration without initializer followed by an assignment of the same variable
//!    takes the assigned value as initializer, unless the value reads the variable
//! 4. Leftover call-result markers on declarations are cleared
//! 5. An expression standing alone in a statement list is wrapped in an expression
//!    statement
//!
//! Running the pass on its own output changes nothing.

use crate::script::{AstId, Node, ScriptTree, VarId};

/// Normalizes a [`ScriptTree`] in place.
pub struct CleanupPass;

impl Default for CleanupPass {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupPass {
    /// Creates a new cleanup pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs every rule over `tree`.
    ///
    /// # Returns
    ///
    /// The number of rewrites applied.
    pub fn run(&self, tree: &mut ScriptTree) -> usize {
        let mut changes = 0;
        for node in tree.walk() {
            if tree.node(node).body().is_none() {
                continue;
            }
            changes += Self::flatten(tree, node);
            changes += Self::promote(tree, node);
            changes += Self::clear_markers(tree, node);
            changes += Self::merge_members(tree, node);
            changes += Self::fold_initializers(tree, node);
        }
        if changes > 0 {
            log::debug!("{}: cleanup applied {changes} rewrites", tree.signature.name);
        }
        changes
    }

    fn flatten(tree: &mut ScriptTree, node: AstId) -> usize {
        let mut changes = 0;
        loop {
            let inner = match tree.children(node) {
                [single] if matches!(tree.node(*single), Node::Block(_)) => *single,
                _ => return changes,
            };
            let statements = tree.children(inner).to_vec();
            tree.detach(inner);
            for statement in statements {
                tree.detach(statement);
                tree.append(node, statement);
            }
            changes += 1;
        }
    }

    fn promote(tree: &mut ScriptTree, node: AstId) -> usize {
        let mut changes = 0;
        for child in tree.children(node).to_vec() {
            if !tree.node(child).is_expression() {
                continue;
            }
            let Some(index) = tree.detach(child) else {
                continue;
            };
            let statement = tree.add(Node::ExprStmt(child));
            tree.insert(node, index, statement);
            changes += 1;
        }
        changes
    }

    fn clear_markers(tree: &mut ScriptTree, node: AstId) -> usize {
        let mut changes = 0;
        for child in tree.children(node).to_vec() {
            if let Node::VarDecl { fcn_return, .. } = tree.node_mut(child) {
                if *fcn_return {
                    *fcn_return = false;
                    changes += 1;
                }
            }
        }
        changes
    }

    /// Uninitialized declaration of an aggregate member, with the aggregate.
    fn member_decl(tree: &ScriptTree, statement: AstId) -> Option<(VarId, VarId)> {
        let Node::VarDecl {
            var, init: None, ..
        } = *tree.node(statement)
        else {
            return None;
        };
        let parent = tree.vars.get(var)?.parent?;
        Some((var, parent))
    }

    fn merge_members(tree: &mut ScriptTree, node: AstId) -> usize {
        let mut changes = 0;
        let mut index = 0;
        while index < tree.children(node).len() {
            let children = tree.children(node).to_vec();
            let Some((_, aggregate)) = Self::member_decl(tree, children[index]) else {
                index += 1;
                continue;
            };
            let members = tree
                .vars
                .get(aggregate)
                .map(|v| v.members.clone())
                .unwrap_or_default();
            let run: Vec<VarId> = children[index..]
                .iter()
                .take(members.len())
                .map_while(|c| Self::member_decl(tree, *c).filter(|(_, p)| *p == aggregate))
                .map(|(member, _)| member)
                .collect();
            if members.is_empty() || run != members {
                index += 1;
                continue;
            }

            let decl = tree.add(Node::VarDecl {
                var: aggregate,
                init: None,
                fcn_return: false,
            });
            tree.replace(children[index], decl);
            for old in &children[index + 1..index + members.len()] {
                tree.detach(*old);
            }
            for member in &members {
                if let Some(var) = tree.vars.get_mut(*member) {
                    var.decl = None;
                }
            }
            if let Some(var) = tree.vars.get_mut(aggregate) {
                var.decl = Some(decl);
            }
            changes += 1;
            index += 1;
        }
        changes
    }

    fn fold_initializers(tree: &mut ScriptTree, node: AstId) -> usize {
        let mut changes = 0;
        let mut index = 0;
        while index + 1 < tree.children(node).len() {
            let children = tree.children(node);
            let (decl, next) = (children[index], children[index + 1]);
            index += 1;

            let Node::VarDecl {
                var, init: None, ..
            } = *tree.node(decl)
            else {
                continue;
            };
            let Node::ExprStmt(expr) = *tree.node(next) else {
                continue;
            };
            let Node::ModifyExp { target, value } = *tree.node(expr) else {
                continue;
            };
            if *tree.node(target) != Node::VarRef(var) || Self::reads(tree, value, var) {
                continue;
            }

            if let Node::VarDecl { init, .. } = tree.node_mut(decl) {
                *init = Some(value);
            }
            tree.adopt(decl, value);
            tree.detach(next);
            changes += 1;
        }
        changes
    }

    /// `true` when `expr` reads `var` or one of its members.
    fn reads(tree: &ScriptTree, expr: AstId, var: VarId) -> bool {
        match tree.node(expr) {
            Node::VarRef(used) => *used == var || tree.vars.root(*used) == var,
            other => other
                .operands()
                .into_iter()
                .any(|operand| Self::reads(tree, operand, var)),
        }
    }
}
