//! Arena of script nodes for one subroutine.

use std::sync::Arc;

use crate::{
    bytecode::SubId,
    script::{AstId, Node, VarId, VarKind, VarTable},
    types::{StructTable, Type},
};

/// Role of a reconstructed subroutine in the rendered program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// An ordinary function with a signature and a body
    Function,
    /// The globals initializer; its statements render as global declarations
    Globals,
}

/// Signature of a reconstructed function.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Function name
    pub name: String,
    /// Return type
    pub return_type: Type,
    /// Parameter variables in declaration order
    pub params: Vec<VarId>,
}

/// The statement tree of one subroutine.
///
/// Nodes live in an arena and refer to each other by [`AstId`]. Parent links are index
/// fields maintained by the attach and detach operations; a detached node simply has no
/// parent and is not reachable from [`ScriptTree::root`].
#[derive(Debug, Clone)]
pub struct ScriptTree {
    nodes: Vec<Node>,
    parents: Vec<Option<AstId>>,
    root: AstId,
    /// Variables referenced by the tree
    pub vars: VarTable,
    /// Subroutine this tree was reconstructed from
    pub sub: SubId,
    /// Rendering role
    pub kind: ScriptKind,
    /// Function signature
    pub signature: Signature,
    /// Aggregate type names shared by the whole program
    pub structs: Arc<StructTable>,
    /// One level of indentation
    pub indent: String,
}

impl ScriptTree {
    /// An empty tree whose root block spans `start..end`.
    #[must_use]
    pub fn new(sub: SubId, kind: ScriptKind, signature: Signature, start: u32, end: u32) -> Self {
        let mut tree = ScriptTree {
            nodes: Vec::new(),
            parents: Vec::new(),
            root: AstId(0),
            vars: VarTable::new(),
            sub,
            kind,
            signature,
            structs: Arc::new(StructTable::new()),
            indent: "    ".to_string(),
        };
        tree.root = tree.add(Node::Block(crate::script::Body::new(start, end)));
        tree
    }

    /// The subroutine body.
    #[must_use]
    pub fn root(&self) -> AstId {
        self.root
    }

    /// Number of nodes in the arena, attached or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node; its expression operands become its children.
    pub fn add(&mut self, node: Node) -> AstId {
        let id = AstId(self.nodes.len());
        for operand in node.operands() {
            if let Some(parent) = self.parents.get_mut(operand.0) {
                *parent = Some(id);
            }
        }
        self.nodes.push(node);
        self.parents.push(None);
        id
    }

    /// Node by id.
    #[must_use]
    pub fn node(&self, id: AstId) -> &Node {
        &self.nodes[id.0]
    }

    /// Mutable node by id.
    pub fn node_mut(&mut self, id: AstId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Parent of `id`: the root-bearing node holding it or the expression using it.
    #[must_use]
    pub fn parent(&self, id: AstId) -> Option<AstId> {
        self.parents.get(id.0).copied().flatten()
    }

    /// Records `parent` as the user of an operand attached after construction.
    pub(crate) fn adopt(&mut self, parent: AstId, child: AstId) {
        if let Some(slot) = self.parents.get_mut(child.0) {
            *slot = Some(parent);
        }
    }

    /// Child statements of a root-bearing node; empty for other nodes.
    #[must_use]
    pub fn children(&self, id: AstId) -> &[AstId] {
        self.node(id).body().map_or(&[], |b| b.children.as_slice())
    }

    /// Appends `child` to the statements of `parent`.
    pub fn append(&mut self, parent: AstId, child: AstId) {
        if let Some(body) = self.nodes[parent.0].body_mut() {
            body.children.push(child);
            self.parents[child.0] = Some(parent);
        }
    }

    /// Inserts `child` at `index` in the statements of `parent`.
    pub fn insert(&mut self, parent: AstId, index: usize, child: AstId) {
        if let Some(body) = self.nodes[parent.0].body_mut() {
            let index = index.min(body.children.len());
            body.children.insert(index, child);
            self.parents[child.0] = Some(parent);
        }
    }

    /// Removes `child` from its parent's statements.
    ///
    /// # Returns
    ///
    /// The index it was removed from.
    pub fn detach(&mut self, child: AstId) -> Option<usize> {
        let parent = self.parent(child)?;
        let body = self.nodes[parent.0].body_mut()?;
        let index = body.children.iter().position(|c| *c == child)?;
        body.children.remove(index);
        self.parents[child.0] = None;
        Some(index)
    }

    /// Puts `new` in the statement slot of `old`, detaching `old`.
    ///
    /// # Returns
    ///
    /// `false` when `old` is not attached to a statement list.
    pub fn replace(&mut self, old: AstId, new: AstId) -> bool {
        let Some(parent) = self.parent(old) else {
            return false;
        };
        let Some(body) = self.nodes[parent.0].body_mut() else {
            return false;
        };
        let Some(index) = body.children.iter().position(|c| *c == old) else {
            return false;
        };
        body.children[index] = new;
        self.parents[old.0] = None;
        self.parents[new.0] = Some(parent);
        true
    }

    /// Copies an expression subtree; the copy is detached.
    pub fn duplicate(&mut self, id: AstId) -> AstId {
        let mut node = self.node(id).clone();
        match &mut node {
            Node::Member { base, .. } => *base = self.duplicate(*base),
            Node::VectorLit(members) => {
                for member in members.iter_mut() {
                    *member = self.duplicate(*member);
                }
            }
            Node::ModifyExp { target, value } => {
                *target = self.duplicate(*target);
                *value = self.duplicate(*value);
            }
            Node::BinaryExp { lhs, rhs, .. } | Node::ConditionalExp { lhs, rhs, .. } => {
                *lhs = self.duplicate(*lhs);
                *rhs = self.duplicate(*rhs);
            }
            Node::UnaryExp { operand, .. } => *operand = self.duplicate(*operand),
            Node::UnaryModExp { target, .. } => *target = self.duplicate(*target),
            Node::ActionCall { args, .. } | Node::SubCall { args, .. } => {
                for arg in args.iter_mut() {
                    *arg = self.duplicate(*arg);
                }
            }
            _ => {}
        }
        self.add(node)
    }

    /// `true` when evaluating `id` can change program state.
    #[must_use]
    pub fn has_side_effects(&self, id: AstId) -> bool {
        match self.node(id) {
            Node::ModifyExp { .. }
            | Node::UnaryModExp { .. }
            | Node::ActionCall { .. }
            | Node::SubCall { .. } => true,
            other => other.operands().into_iter().any(|op| self.has_side_effects(op)),
        }
    }

    /// Pre-order walk of every node reachable from the root.
    #[must_use]
    pub fn walk(&self) -> Vec<AstId> {
        let mut order = Vec::new();
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            order.push(id);
            let node = self.node(id);
            let mut next: Vec<AstId> = node.operands();
            next.extend(self.children(id).iter().copied());
            pending.extend(next.into_iter().rev());
        }
        order
    }

    /// Number of synthesized placeholders reachable from the root, counting placeholder
    /// expressions, error comments, unknown actions and referenced variables with
    /// reserved names.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        let mut nodes = 0;
        let mut used: Vec<VarId> = self.signature.params.clone();
        for id in self.walk() {
            match self.node(id) {
                Node::Placeholder(_) | Node::ErrorComment(_) => nodes += 1,
                Node::ActionCall { name, .. } if name.starts_with("__") => nodes += 1,
                Node::VarRef(var) => used.push(self.vars.root(*var)),
                Node::VarDecl { var, .. } => used.push(*var),
                _ => {}
            }
        }
        used.sort();
        used.dedup();
        let vars = used
            .into_iter()
            .filter_map(|id| self.vars.get(id))
            .filter(|v| {
                matches!(v.kind, VarKind::Local | VarKind::Param | VarKind::Global)
                    && v.name.as_deref().is_some_and(|n| n.starts_with("__"))
            })
            .count();
        nodes + vars
    }

    /// Source name of a variable use, resolving aggregate members to `base.field`.
    #[must_use]
    pub fn var_name(&self, id: VarId) -> String {
        let Some(var) = self.vars.get(id) else {
            return "__unknown_operand".to_string();
        };
        if let Some(parent) = var.parent {
            let index = self
                .vars
                .get(parent)
                .and_then(|p| p.members.iter().position(|m| *m == id))
                .unwrap_or(0);
            let parent_ty = self.vars.get(parent).map_or(Type::INVALID, |p| p.ty.clone());
            return format!(
                "{}.{}",
                self.var_name(parent),
                VarTable::member_name(&parent_ty, index)
            );
        }
        match &var.name {
            Some(name) => name.clone(),
            None => format!("__var{}", id.index()),
        }
    }
}
