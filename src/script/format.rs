//! Precedence-aware expression printing.
//!
//! [`ExpressionFormatter::render`] prints an expression subtree with the minimum of
//! parentheses. A child is parenthesized when it binds weaker than its parent, or when it
//! binds equally and sits on the right of an operator that is not associative (or is a
//! different operator of the same level): `a - (b - c)`, `a + b - c`, `a * (b / c)`.

use crate::{
    bytecode::Constant,
    script::{AstId, Node, Precedence, ScriptTree, VarKind, Variable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Stateless printer over the nodes of one [`ScriptTree`].
pub struct ExpressionFormatter<'a> {
    tree: &'a ScriptTree,
}

impl<'a> ExpressionFormatter<'a> {
    /// Creates a formatter for expressions of `tree`.
    #[must_use]
    pub fn new(tree: &'a ScriptTree) -> Self {
        ExpressionFormatter { tree }
    }

    /// Renders `expr` as source text.
    #[must_use]
    pub fn render(&self, expr: AstId) -> String {
        self.render_operand(expr, None, Side::Left)
    }

    /// Source spelling of a literal.
    #[must_use]
    pub fn literal(value: &Constant) -> String {
        match value {
            Constant::Int(v) => v.to_string(),
            Constant::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1.0e9 {
                    format!("{v:.1}")
                } else {
                    format!("{v}")
                }
            }
            Constant::String(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        other => out.push(other),
                    }
                }
                out.push('"');
                out
            }
            Constant::Object(0) => "OBJECT_SELF".to_string(),
            Constant::Object(1) => "OBJECT_INVALID".to_string(),
            Constant::Object(v) => v.to_string(),
        }
    }

    /// Renders `expr` as an operand of an operator node.
    ///
    /// `parent` is the parent's identity and precedence, `None` at the top of an
    /// expression or inside a delimited context (arguments, subscripts).
    fn render_operand(&self, expr: AstId, parent: Option<(AstId, Precedence)>, side: Side) -> String {
        let text = self.render_node(expr);
        let Some((parent_id, parent_prec)) = parent else {
            return text;
        };
        let own = self.tree.node(expr).precedence();
        let wrap = own < parent_prec
            || (own == parent_prec
                && side == Side::Right
                && own != Precedence::Assignment
                && own != Precedence::Unary
                && !self.same_associative(parent_id, expr));
        if wrap {
            format!("({text})")
        } else {
            text
        }
    }

    fn same_associative(&self, parent: AstId, child: AstId) -> bool {
        match (self.tree.node(parent), self.tree.node(child)) {
            (Node::BinaryExp { op: a, .. }, Node::BinaryExp { op: b, .. }) => {
                a == b && a.is_associative()
            }
            (Node::ConditionalExp { op: a, .. }, Node::ConditionalExp { op: b, .. }) => a == b,
            _ => false,
        }
    }

    fn render_args(&self, args: &[AstId]) -> String {
        args.iter()
            .map(|arg| self.render(*arg))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_node(&self, expr: AstId) -> String {
        let node = self.tree.node(expr);
        let prec = node.precedence();
        match node {
            Node::Const(value) => Self::literal(value),
            Node::VarRef(var) => match self.tree.vars.get(*var) {
                Some(Variable {
                    kind: VarKind::Temp,
                    value: Some(value),
                    ..
                }) => self.render_node(*value),
                _ => self.tree.var_name(*var),
            },
            Node::Member { base, field } => {
                format!(
                    "{}.{}",
                    self.render_operand(*base, Some((expr, Precedence::Primary)), Side::Left),
                    field
                )
            }
            Node::VectorLit(members) => format!("[{}]", self.render_args(members)),
            Node::ModifyExp { target, value } => format!(
                "{} = {}",
                self.render_operand(*target, Some((expr, prec)), Side::Left),
                self.render_operand(*value, Some((expr, prec)), Side::Right)
            ),
            Node::BinaryExp { op, lhs, rhs } => format!(
                "{} {} {}",
                self.render_operand(*lhs, Some((expr, prec)), Side::Left),
                op.symbol(),
                self.render_operand(*rhs, Some((expr, prec)), Side::Right)
            ),
            Node::ConditionalExp { op, lhs, rhs } => format!(
                "{} {} {}",
                self.render_operand(*lhs, Some((expr, prec)), Side::Left),
                op.symbol(),
                self.render_operand(*rhs, Some((expr, prec)), Side::Right)
            ),
            Node::UnaryExp { op, operand } => {
                let inner = self.render_operand(*operand, Some((expr, prec)), Side::Right);
                if inner.starts_with(op.symbol()) {
                    format!("{}({inner})", op.symbol())
                } else {
                    format!("{}{inner}", op.symbol())
                }
            }
            Node::UnaryModExp { op, prefix, target } => {
                let inner = self.render_operand(*target, Some((expr, prec)), Side::Right);
                if *prefix {
                    format!("{}{inner}", op.symbol())
                } else {
                    format!("{inner}{}", op.symbol())
                }
            }
            Node::ActionCall { name, args, .. } | Node::SubCall { name, args, .. } => {
                format!("{name}({})", self.render_args(args))
            }
            Node::ActionArg(body) => match body.children.as_slice() {
                [single] => match self.tree.node(*single) {
                    Node::ExprStmt(inner) => self.render(*inner),
                    Node::VarDecl {
                        init: Some(inner), ..
                    } => self.render(*inner),
                    other if other.is_expression() => self.render(*single),
                    _ => "__unknown_operand".to_string(),
                },
                _ => "__unknown_operand".to_string(),
            },
            Node::Placeholder(name) => name.clone(),
            _ => "__unknown_operand".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::SubId,
        script::{BinaryOp, LogicalOp, ScriptKind, Signature, UnaryOp},
        types::Type,
    };

    fn tree() -> ScriptTree {
        ScriptTree::new(
            SubId::new(0),
            ScriptKind::Function,
            Signature {
                name: "main".into(),
                return_type: Type::VOID,
                params: Vec::new(),
            },
            13,
            13,
        )
    }

    fn int(t: &mut ScriptTree, v: i32) -> AstId {
        t.add(Node::Const(Constant::Int(v)))
    }

    fn bin(t: &mut ScriptTree, op: BinaryOp, lhs: AstId, rhs: AstId) -> AstId {
        t.add(Node::BinaryExp { op, lhs, rhs })
    }

    #[test]
    fn test_parenthesizes_weaker_child() {
        let mut t = tree();
        let (a, b, c) = (int(&mut t, 1), int(&mut t, 2), int(&mut t, 3));
        let sum = bin(&mut t, BinaryOp::Add, a, b);
        let product = bin(&mut t, BinaryOp::Mul, sum, c);
        assert_eq!(ExpressionFormatter::new(&t).render(product), "(1 + 2) * 3");
    }

    #[test]
    fn test_right_side_of_non_associative() {
        let mut t = tree();
        let (a, b, c) = (int(&mut t, 1), int(&mut t, 2), int(&mut t, 3));
        let inner = bin(&mut t, BinaryOp::Sub, b, c);
        let outer = bin(&mut t, BinaryOp::Sub, a, inner);
        assert_eq!(ExpressionFormatter::new(&t).render(outer), "1 - (2 - 3)");

        let (d, e, f) = (int(&mut t, 4), int(&mut t, 5), int(&mut t, 6));
        let left = bin(&mut t, BinaryOp::Sub, d, e);
        let chained = bin(&mut t, BinaryOp::Sub, left, f);
        assert_eq!(ExpressionFormatter::new(&t).render(chained), "4 - 5 - 6");

        let (g, h, i) = (int(&mut t, 7), int(&mut t, 8), int(&mut t, 9));
        let right = bin(&mut t, BinaryOp::Add, h, i);
        let assoc = bin(&mut t, BinaryOp::Add, g, right);
        assert_eq!(ExpressionFormatter::new(&t).render(assoc), "7 + 8 + 9");
    }

    #[test]
    fn test_logical_and_unary() {
        let mut t = tree();
        let (a, b, c) = (int(&mut t, 1), int(&mut t, 2), int(&mut t, 3));
        let or = t.add(Node::ConditionalExp {
            op: LogicalOp::Or,
            lhs: a,
            rhs: b,
        });
        let and = t.add(Node::ConditionalExp {
            op: LogicalOp::And,
            lhs: or,
            rhs: c,
        });
        let not = t.add(Node::UnaryExp {
            op: UnaryOp::Not,
            operand: and,
        });
        assert_eq!(ExpressionFormatter::new(&t).render(not), "!((1 || 2) && 3)");

        let five = int(&mut t, 5);
        let neg = t.add(Node::UnaryExp {
            op: UnaryOp::Negate,
            operand: five,
        });
        let twice = t.add(Node::UnaryExp {
            op: UnaryOp::Negate,
            operand: neg,
        });
        assert_eq!(ExpressionFormatter::new(&t).render(twice), "-(-5)");
    }

    #[test]
    fn test_literals() {
        assert_eq!(ExpressionFormatter::literal(&Constant::Float(1.0)), "1.0");
        assert_eq!(ExpressionFormatter::literal(&Constant::Float(0.5)), "0.5");
        assert_eq!(
            ExpressionFormatter::literal(&Constant::String("say \"hi\"".into())),
            "\"say \\\"hi\\\"\""
        );
        assert_eq!(ExpressionFormatter::literal(&Constant::Object(0)), "OBJECT_SELF");
        assert_eq!(ExpressionFormatter::literal(&Constant::Object(1)), "OBJECT_INVALID");
    }

    #[test]
    fn test_calls_and_vectors() {
        let mut t = tree();
        let x = t.add(Node::Const(Constant::Float(1.0)));
        let y = t.add(Node::Const(Constant::Float(2.0)));
        let z = t.add(Node::Const(Constant::Float(0.5)));
        let v = t.add(Node::VectorLit([x, y, z]));
        let call = t.add(Node::ActionCall {
            id: 9,
            name: "VectorMagnitude".into(),
            args: vec![v],
        });
        assert_eq!(
            ExpressionFormatter::new(&t).render(call),
            "VectorMagnitude([1.0, 2.0, 0.5])"
        );
    }
}
