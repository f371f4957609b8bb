//! Script AST node kinds.
//!
//! Statements and expressions share one tagged union, [`Node`], stored in the arena of a
//! [`crate::script::ScriptTree`] and addressed by [`AstId`]. Nodes that own statements
//! (bodies of subroutines, branches, loops, switch cases and closures) carry a [`Body`]
//! with the byte range of the instructions they were built from.

use std::fmt;

use crate::{
    bytecode::{Constant, Opcode, SubId},
    script::VarId,
};

/// Arena index of a script node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AstId(pub(crate) usize);

impl AstId {
    /// Creates an `AstId` from a raw arena index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        AstId(index)
    }

    /// The raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for AstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AstId({})", self.0)
    }
}

/// Operator binding strength, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    /// `=`
    Assignment,
    /// `||`
    LogicalOr,
    /// `&&`
    LogicalAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
    /// `==`, `!=`
    Equality,
    /// `<`, `>`, `<=`, `>=`
    Relational,
    /// `<<`, `>>`, `>>>`
    Shift,
    /// `+`, `-`
    Additive,
    /// `*`, `/`, `%`
    Multiplicative,
    /// Prefix and postfix operators
    Unary,
    /// Literals, names, calls and member access
    Primary,
}

/// Two-operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>=`
    GreaterEqual,
    /// `>`
    Greater,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
    /// `>>>`
    UnsignedShiftRight,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

impl BinaryOp {
    /// Operator computed by a binary instruction, `None` for the logical operators.
    #[must_use]
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        Some(match opcode {
            Opcode::IncOr => BinaryOp::BitOr,
            Opcode::ExcOr => BinaryOp::BitXor,
            Opcode::BoolAnd => BinaryOp::BitAnd,
            Opcode::Equal => BinaryOp::Equal,
            Opcode::NEqual => BinaryOp::NotEqual,
            Opcode::Geq => BinaryOp::GreaterEqual,
            Opcode::Gt => BinaryOp::Greater,
            Opcode::Lt => BinaryOp::Less,
            Opcode::Leq => BinaryOp::LessEqual,
            Opcode::ShLeft => BinaryOp::ShiftLeft,
            Opcode::ShRight => BinaryOp::ShiftRight,
            Opcode::UShRight => BinaryOp::UnsignedShiftRight,
            Opcode::Add => BinaryOp::Add,
            Opcode::Sub => BinaryOp::Sub,
            Opcode::Mul => BinaryOp::Mul,
            Opcode::Div => BinaryOp::Div,
            Opcode::Mod => BinaryOp::Mod,
            _ => return None,
        })
    }

    /// Source symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Greater => ">",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::UnsignedShiftRight => ">>>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    /// Binding strength.
    #[must_use]
    pub fn precedence(self) -> Precedence {
        match self {
            BinaryOp::BitOr => Precedence::BitOr,
            BinaryOp::BitXor => Precedence::BitXor,
            BinaryOp::BitAnd => Precedence::BitAnd,
            BinaryOp::Equal | BinaryOp::NotEqual => Precedence::Equality,
            BinaryOp::GreaterEqual | BinaryOp::Greater | BinaryOp::Less | BinaryOp::LessEqual => {
                Precedence::Relational
            }
            BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::UnsignedShiftRight => {
                Precedence::Shift
            }
            BinaryOp::Add | BinaryOp::Sub => Precedence::Additive,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => Precedence::Multiplicative,
        }
    }

    /// `true` when `a op (b op c)` equals `(a op b) op c`.
    #[must_use]
    pub fn is_associative(self) -> bool {
        matches!(
            self,
            BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::BitAnd | BinaryOp::Add | BinaryOp::Mul
        )
    }
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
}

impl LogicalOp {
    /// Operator computed by `LOGAND`/`LOGOR`.
    #[must_use]
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::LogAnd => Some(LogicalOp::And),
            Opcode::LogOr => Some(LogicalOp::Or),
            _ => None,
        }
    }

    /// Source symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }

    /// Binding strength.
    #[must_use]
    pub fn precedence(self) -> Precedence {
        match self {
            LogicalOp::And => Precedence::LogicalAnd,
            LogicalOp::Or => Precedence::LogicalOr,
        }
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-`
    Negate,
    /// `!`
    Not,
    /// `~`
    Complement,
}

impl UnaryOp {
    /// Operator computed by `NEG`, `NOT` or `COMP`.
    #[must_use]
    pub fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Neg => Some(UnaryOp::Negate),
            Opcode::Not => Some(UnaryOp::Not),
            Opcode::Comp => Some(UnaryOp::Complement),
            _ => None,
        }
    }

    /// Source symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::Complement => "~",
        }
    }
}

/// `++` / `--`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOp {
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

impl StepOp {
    /// Source symbol.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            StepOp::Increment => "++",
            StepOp::Decrement => "--",
        }
    }
}

/// Ordered statements of a root-bearing node and the byte range they came from.
///
/// `end` is exclusive: the first instruction at or past `end` closes the node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Body {
    /// Child statements in source order
    pub children: Vec<AstId>,
    /// Position of the first instruction
    pub start: u32,
    /// Position one past the last instruction
    pub end: u32,
}

impl Body {
    /// An empty body over `start..end`.
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        Body {
            children: Vec::new(),
            start,
            end,
        }
    }
}

/// One statement or expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A subroutine body or nested scope
    Block(Body),
    /// `if (condition) { ... }`; `skip` is the destination of the trailing skip-else jump
    If {
        /// Branch condition, attached by the conditional jump
        condition: Option<AstId>,
        /// Guarded statements
        body: Body,
        /// Destination of the jump over the else branch
        skip: Option<u32>,
    },
    /// The else branch of the preceding `If` sibling
    Else(Body),
    /// `while (condition) { ... }`
    WhileLoop {
        /// Loop condition
        condition: Option<AstId>,
        /// Loop body
        body: Body,
    },
    /// `do { ... } while (condition);`
    DoLoop {
        /// Loop condition
        condition: Option<AstId>,
        /// Loop body
        body: Body,
    },
    /// `switch (subject) { ... }`; children are [`Node::SwitchCase`]
    Switch {
        /// Switched-on value
        subject: AstId,
        /// Cases in source order
        body: Body,
    },
    /// `case label:` or `default:`
    SwitchCase {
        /// Case literal, `None` for `default`
        label: Option<AstId>,
        /// Case statements
        body: Body,
    },
    /// Deferred action argument: the statements run when the action fires
    ActionArg(Body),
    /// Variable declaration
    VarDecl {
        /// Declared variable
        var: VarId,
        /// Initializer
        init: Option<AstId>,
        /// `true` while the initializer is a call result not yet claimed by a use
        fcn_return: bool,
    },
    /// Expression evaluated for its side effects
    ExprStmt(AstId),
    /// `return [value];`
    Return(Option<AstId>),
    /// `break;`
    Break,
    /// `continue;`
    Continue,
    /// An inline comment marking something that could not be reconstructed
    ErrorComment(String),
    /// Literal
    Const(Constant),
    /// Variable use
    VarRef(VarId),
    /// Aggregate member access; `field` is the member's source name
    Member {
        /// Aggregate expression
        base: AstId,
        /// Member name (`x`, `y`, `z` for vectors)
        field: String,
    },
    /// `[x, y, z]`
    VectorLit([AstId; 3]),
    /// Assignment
    ModifyExp {
        /// Assigned place
        target: AstId,
        /// Assigned value
        value: AstId,
    },
    /// Arithmetic, bitwise or comparison operator
    BinaryExp {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: AstId,
        /// Right operand
        rhs: AstId,
    },
    /// Short-circuit operator
    ConditionalExp {
        /// Operator
        op: LogicalOp,
        /// Left operand
        lhs: AstId,
        /// Right operand
        rhs: AstId,
    },
    /// Prefix operator
    UnaryExp {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: AstId,
    },
    /// `++`/`--` on a variable
    UnaryModExp {
        /// Operator
        op: StepOp,
        /// `true` for `++x`, `false` for `x++`
        prefix: bool,
        /// Modified place
        target: AstId,
    },
    /// Engine action call
    ActionCall {
        /// Action id
        id: u16,
        /// Action name, or a placeholder for unknown ids
        name: String,
        /// Arguments in declaration order
        args: Vec<AstId>,
    },
    /// Subroutine call
    SubCall {
        /// Called subroutine
        sub: SubId,
        /// Callee name
        name: String,
        /// Arguments in declaration order
        args: Vec<AstId>,
    },
    /// A synthesized stand-in for a value that could not be recovered
    Placeholder(String),
}

impl Node {
    /// Statement list of a root-bearing node.
    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        match self {
            Node::Block(body)
            | Node::Else(body)
            | Node::ActionArg(body)
            | Node::If { body, .. }
            | Node::WhileLoop { body, .. }
            | Node::DoLoop { body, .. }
            | Node::Switch { body, .. }
            | Node::SwitchCase { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Mutable statement list of a root-bearing node.
    pub fn body_mut(&mut self) -> Option<&mut Body> {
        match self {
            Node::Block(body)
            | Node::Else(body)
            | Node::ActionArg(body)
            | Node::If { body, .. }
            | Node::WhileLoop { body, .. }
            | Node::DoLoop { body, .. }
            | Node::Switch { body, .. }
            | Node::SwitchCase { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Expression children, in evaluation order.
    #[must_use]
    pub fn operands(&self) -> Vec<AstId> {
        match self {
            Node::If { condition, .. }
            | Node::WhileLoop { condition, .. }
            | Node::DoLoop { condition, .. } => condition.iter().copied().collect(),
            Node::Switch { subject, .. } => vec![*subject],
            Node::SwitchCase { label, .. } => label.iter().copied().collect(),
            Node::VarDecl { init, .. } => init.iter().copied().collect(),
            Node::ExprStmt(expr) => vec![*expr],
            Node::Return(value) => value.iter().copied().collect(),
            Node::Member { base, .. } => vec![*base],
            Node::VectorLit(members) => members.to_vec(),
            Node::ModifyExp { target, value } => vec![*target, *value],
            Node::BinaryExp { lhs, rhs, .. } | Node::ConditionalExp { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            Node::UnaryExp { operand, .. } => vec![*operand],
            Node::UnaryModExp { target, .. } => vec![*target],
            Node::ActionCall { args, .. } | Node::SubCall { args, .. } => args.clone(),
            _ => Vec::new(),
        }
    }

    /// `true` for value-producing nodes.
    #[must_use]
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            Node::Const(_)
                | Node::VarRef(_)
                | Node::Member { .. }
                | Node::VectorLit(_)
                | Node::ModifyExp { .. }
                | Node::BinaryExp { .. }
                | Node::ConditionalExp { .. }
                | Node::UnaryExp { .. }
                | Node::UnaryModExp { .. }
                | Node::ActionCall { .. }
                | Node::SubCall { .. }
                | Node::Placeholder(_)
                | Node::ActionArg(_)
        )
    }

    /// Binding strength of an expression node.
    #[must_use]
    pub fn precedence(&self) -> Precedence {
        match self {
            Node::ModifyExp { .. } => Precedence::Assignment,
            Node::ConditionalExp { op, .. } => op.precedence(),
            Node::BinaryExp { op, .. } => op.precedence(),
            Node::UnaryExp { .. } | Node::UnaryModExp { .. } => Precedence::Unary,
            _ => Precedence::Primary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_order() {
        assert!(Precedence::Assignment < Precedence::LogicalOr);
        assert!(Precedence::LogicalOr < Precedence::LogicalAnd);
        assert!(Precedence::BitAnd < Precedence::Equality);
        assert!(Precedence::Shift < Precedence::Additive);
        assert!(Precedence::Multiplicative < Precedence::Unary);
    }

    #[test]
    fn test_operator_mapping() {
        assert_eq!(BinaryOp::from_opcode(Opcode::Add), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::from_opcode(Opcode::LogAnd), None);
        assert_eq!(LogicalOp::from_opcode(Opcode::LogOr), Some(LogicalOp::Or));
        assert_eq!(UnaryOp::from_opcode(Opcode::Comp), Some(UnaryOp::Complement));
        assert_eq!(BinaryOp::UnsignedShiftRight.symbol(), ">>>");
        assert!(!BinaryOp::Sub.is_associative());
    }

    #[test]
    fn test_body_access() {
        let mut node = Node::If {
            condition: None,
            body: Body::new(20, 40),
            skip: None,
        };
        node.body_mut().unwrap().children.push(AstId::new(3));
        assert_eq!(node.body().unwrap().children, vec![AstId::new(3)]);
        assert!(Node::Break.body().is_none());
        assert!(!node.is_expression());
        assert!(Node::Placeholder("__unknown_operand".into()).is_expression());
    }
}
