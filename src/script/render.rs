//! Statement rendering.

use std::fmt::Write;

use crate::{
    script::{AstId, ExpressionFormatter, Node, ScriptKind, ScriptTree, VarId},
    types::Type,
};

impl ScriptTree {
    /// Source spelling of a type, naming shared aggregates.
    #[must_use]
    pub fn spell(&self, ty: &Type) -> String {
        self.structs.spell(ty)
    }

    /// `int sub1(int intParam1, string stringParam1)`.
    #[must_use]
    pub fn prototype(&self) -> String {
        let params: Vec<String> = self
            .signature
            .params
            .iter()
            .map(|p| self.declaration(*p))
            .collect();
        format!(
            "{} {}({})",
            self.spell(&self.signature.return_type),
            self.signature.name,
            params.join(", ")
        )
    }

    fn declaration(&self, var: VarId) -> String {
        let ty = self
            .vars
            .get(var)
            .map_or_else(|| Type::INVALID, |v| v.ty.clone());
        format!("{} {}", self.spell(&ty), self.var_name(var))
    }

    /// Renders the subroutine.
    ///
    /// Functions render as `prototype { body }`; the globals initializer renders its
    /// statements at top level.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        match self.kind {
            ScriptKind::Function => {
                let _ = writeln!(out, "{} {{", self.prototype());
                self.write_children(&mut out, self.root(), 1);
                out.push_str("}\n");
            }
            ScriptKind::Globals => self.write_children(&mut out, self.root(), 0),
        }
        out
    }

    fn pad(&self, depth: usize) -> String {
        self.indent.repeat(depth)
    }

    fn expr(&self, id: AstId) -> String {
        ExpressionFormatter::new(self).render(id)
    }

    fn write_children(&self, out: &mut String, parent: AstId, depth: usize) {
        let children = self.children(parent);
        let mut index = 0;
        while index < children.len() {
            let id = children[index];
            let else_branch = children
                .get(index + 1)
                .copied()
                .filter(|next| matches!(self.node(*next), Node::Else(_)));
            if matches!(self.node(id), Node::If { .. }) {
                let pad = self.pad(depth);
                out.push_str(&pad);
                self.write_if(out, id, else_branch, depth);
                out.push('\n');
                index += if else_branch.is_some() { 2 } else { 1 };
                continue;
            }
            self.write_statement(out, id, depth);
            index += 1;
        }
    }

    /// Writes `if (...) { ... }` and its else branch, without leading padding or trailing
    /// newline; an else branch holding only another if chain renders as `else if`.
    fn write_if(&self, out: &mut String, id: AstId, else_branch: Option<AstId>, depth: usize) {
        let condition = match self.node(id) {
            Node::If {
                condition: Some(c), ..
            } => self.expr(*c),
            _ => "__unknown_operand".to_string(),
        };
        let _ = writeln!(out, "if ({condition}) {{");
        self.write_children(out, id, depth + 1);
        out.push_str(&self.pad(depth));
        out.push('}');

        let Some(else_id) = else_branch else {
            return;
        };
        let nested = self.children(else_id);
        let chained = match nested {
            [inner] if matches!(self.node(*inner), Node::If { .. }) => Some((*inner, None)),
            [inner, tail]
                if matches!(self.node(*inner), Node::If { .. })
                    && matches!(self.node(*tail), Node::Else(_)) =>
            {
                Some((*inner, Some(*tail)))
            }
            _ => None,
        };
        match chained {
            Some((inner, tail)) => {
                out.push_str(" else ");
                self.write_if(out, inner, tail, depth);
            }
            None => {
                out.push_str(" else {\n");
                self.write_children(out, else_id, depth + 1);
                out.push_str(&self.pad(depth));
                out.push('}');
            }
        }
    }

    fn write_block(&self, out: &mut String, header: &str, id: AstId, depth: usize) {
        let pad = self.pad(depth);
        let _ = writeln!(out, "{pad}{header}{{");
        self.write_children(out, id, depth + 1);
        let _ = writeln!(out, "{pad}}}");
    }

    fn write_statement(&self, out: &mut String, id: AstId, depth: usize) {
        let pad = self.pad(depth);
        match self.node(id) {
            Node::Block(_) | Node::ActionArg(_) => self.write_block(out, "", id, depth),
            Node::If { .. } => {
                out.push_str(&pad);
                self.write_if(out, id, None, depth);
                out.push('\n');
            }
            Node::Else(_) => self.write_block(out, "else ", id, depth),
            Node::WhileLoop { condition, .. } => {
                let condition = condition.map_or_else(|| "__unknown_operand".to_string(), |c| self.expr(c));
                self.write_block(out, &format!("while ({condition}) "), id, depth);
            }
            Node::DoLoop { condition, .. } => {
                let _ = writeln!(out, "{pad}do {{");
                self.write_children(out, id, depth + 1);
                let condition = condition.map_or_else(|| "__unknown_operand".to_string(), |c| self.expr(c));
                let _ = writeln!(out, "{pad}}} while ({condition});");
            }
            Node::Switch { subject, .. } => {
                let _ = writeln!(out, "{pad}switch ({}) {{", self.expr(*subject));
                for case in self.children(id) {
                    self.write_statement(out, *case, depth + 1);
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Node::SwitchCase { label, .. } => {
                match label {
                    Some(label) => {
                        let _ = writeln!(out, "{pad}case {}:", self.expr(*label));
                    }
                    None => {
                        let _ = writeln!(out, "{pad}default:");
                    }
                }
                self.write_children(out, id, depth + 1);
            }
            Node::VarDecl { var, init, .. } => {
                let decl = self.declaration(*var);
                match init {
                    Some(init) => {
                        let _ = writeln!(out, "{pad}{decl} = {};", self.expr(*init));
                    }
                    None => {
                        let _ = writeln!(out, "{pad}{decl};");
                    }
                }
            }
            Node::ExprStmt(expr) => {
                let _ = writeln!(out, "{pad}{};", self.expr(*expr));
            }
            Node::Return(value) => match value {
                Some(value) => {
                    let _ = writeln!(out, "{pad}return {};", self.expr(*value));
                }
                None => {
                    let _ = writeln!(out, "{pad}return;");
                }
            },
            Node::Break => {
                let _ = writeln!(out, "{pad}break;");
            }
            Node::Continue => {
                let _ = writeln!(out, "{pad}continue;");
            }
            Node::ErrorComment(text) => {
                let _ = writeln!(out, "{pad}/* {text} */");
            }
            _ => {
                let _ = writeln!(out, "{pad}{};", self.expr(id));
            }
        }
    }
}
