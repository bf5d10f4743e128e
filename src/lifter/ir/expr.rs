//! Expression nodes of the lifted IR.
//!
//! [`Expr`] is a closed tagged union; passes match on it exhaustively, so adding a node
//! kind forces every pass to decide how to treat it. Children are owned. Passes rewrite
//! trees through [`Expr::rewrite`], which rebuilds a node from its rewritten children and
//! hands the result to a callback that may replace it.

use std::sync::Arc;

use crate::{
    isil::Mnemonic,
    lifter::ir::{Block, Value, VarId},
    program::FieldDef,
};

/// Comparison operator of a [`Expr::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareKind {
    /// Comparison whose consuming conditional jump was not found
    Unresolved,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
}

impl CompareKind {
    /// Returns the comparison tested by a conditional jump mnemonic.
    #[must_use]
    pub fn from_jump(mnemonic: Mnemonic) -> Option<Self> {
        Some(match mnemonic {
            Mnemonic::JumpIfEqual => CompareKind::Equal,
            Mnemonic::JumpIfNotEqual => CompareKind::NotEqual,
            Mnemonic::JumpIfGreater => CompareKind::Greater,
            Mnemonic::JumpIfGreaterOrEqual => CompareKind::GreaterOrEqual,
            Mnemonic::JumpIfLess => CompareKind::Less,
            Mnemonic::JumpIfLessOrEqual => CompareKind::LessOrEqual,
            _ => return None,
        })
    }

    /// Returns the logical negation, or `None` for [`CompareKind::Unresolved`].
    #[must_use]
    pub fn negate(self) -> Option<Self> {
        Some(match self {
            CompareKind::Unresolved => return None,
            CompareKind::Equal => CompareKind::NotEqual,
            CompareKind::NotEqual => CompareKind::Equal,
            CompareKind::Greater => CompareKind::LessOrEqual,
            CompareKind::GreaterOrEqual => CompareKind::Less,
            CompareKind::Less => CompareKind::GreaterOrEqual,
            CompareKind::LessOrEqual => CompareKind::Greater,
        })
    }

    /// Infix operator text, `None` for [`CompareKind::Unresolved`].
    #[must_use]
    pub fn operator(self) -> Option<&'static str> {
        Some(match self {
            CompareKind::Unresolved => return None,
            CompareKind::Equal => " == ",
            CompareKind::NotEqual => " != ",
            CompareKind::Greater => " > ",
            CompareKind::GreaterOrEqual => " >= ",
            CompareKind::Less => " < ",
            CompareKind::LessOrEqual => " <= ",
        })
    }
}

/// Arithmetic and bitwise operators of a [`Expr::Math`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
}

impl MathOp {
    /// Returns the operator computed by an arithmetic mnemonic.
    #[must_use]
    pub fn from_mnemonic(mnemonic: Mnemonic) -> Option<Self> {
        Some(match mnemonic {
            Mnemonic::Add => MathOp::Add,
            Mnemonic::Subtract => MathOp::Sub,
            Mnemonic::Multiply => MathOp::Mul,
            Mnemonic::Divide => MathOp::Div,
            Mnemonic::ShiftLeft => MathOp::Shl,
            Mnemonic::ShiftRight => MathOp::Shr,
            Mnemonic::And => MathOp::And,
            Mnemonic::Or => MathOp::Or,
            Mnemonic::Xor => MathOp::Xor,
            _ => return None,
        })
    }

    /// Infix operator text.
    #[must_use]
    pub fn operator(self) -> &'static str {
        match self {
            MathOp::Add => " + ",
            MathOp::Sub => " - ",
            MathOp::Mul => " * ",
            MathOp::Div => " / ",
            MathOp::Rem => " % ",
            MathOp::Shl => " << ",
            MathOp::Shr => " >> ",
            MathOp::And => " & ",
            MathOp::Or => " | ",
            MathOp::Xor => " ^ ",
        }
    }

    /// Evaluates the operator on two constants with 64-bit wrapping semantics.
    ///
    /// Returns `None` where the result is undefined: division or remainder by zero,
    /// `i64::MIN / -1`, and shift amounts outside `0..64`.
    #[must_use]
    pub fn fold(self, left: i64, right: i64) -> Option<i64> {
        match self {
            MathOp::Add => Some(left.wrapping_add(right)),
            MathOp::Sub => Some(left.wrapping_sub(right)),
            MathOp::Mul => Some(left.wrapping_mul(right)),
            MathOp::Div => left.checked_div(right),
            MathOp::Rem => left.checked_rem(right),
            MathOp::Shl => shift_amount(right).map(|s| left.wrapping_shl(s)),
            MathOp::Shr => shift_amount(right).map(|s| left.wrapping_shr(s)),
            MathOp::And => Some(left & right),
            MathOp::Or => Some(left | right),
            MathOp::Xor => Some(left ^ right),
        }
    }
}

fn shift_amount(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|s| *s < 64)
}

/// Body of an [`Expr::If`].
#[derive(Debug, Clone, PartialEq)]
pub enum IfBody {
    /// Jump to the block starting at this instruction index
    Goto(usize),
    /// Structured body absorbed from a single-predecessor block
    Block(Box<Block>),
}

/// An IR expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A leaf value
    Value(Value),
    /// `target = value`
    Assign {
        /// Written location
        target: Box<Expr>,
        /// Assigned value
        value: Box<Expr>,
    },
    /// Comparison of two operands
    Compare {
        /// Operator, possibly still unresolved
        kind: CompareKind,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Binary arithmetic
    Math {
        /// Operator
        op: MathOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Complement of the operand
    Not(Box<Expr>),
    /// Memory read or write through the operand address
    Deref(Box<Expr>),
    /// Field access on an object
    MemberAccess {
        /// Object whose field is accessed
        object: Box<Expr>,
        /// Accessed field
        field: Arc<FieldDef>,
    },
    /// Conditional jump or structured conditional
    If {
        /// Condition under which the body runs
        condition: Box<Expr>,
        /// Jump target or absorbed block
        body: IfBody,
    },
    /// Unconditional jump to the block starting at this instruction index
    Goto(usize),
    /// Function call
    Call {
        /// Function reference or pointer expression
        target: Box<Expr>,
        /// Arguments in order, `this` first for instance calls
        arguments: Vec<Expr>,
        /// `true` when the call leaves a value in the return register
        returns: bool,
    },
    /// Return from the method
    Return(Option<Box<Expr>>),
    /// Lane of a vector register
    VectorAccess {
        /// Vector operand
        vector: Box<Expr>,
        /// Lane index
        index: u32,
    },
    /// No operation
    Nop,
    /// Instruction or operand without a lifting rule
    Unsupported(String),
    /// Free-form comment, used for contained faults
    Comment(String),
}

impl Expr {
    /// Leaf register.
    pub fn reg(name: impl Into<String>) -> Self {
        Expr::Value(Value::Register(name.into()))
    }

    /// Leaf immediate.
    #[must_use]
    pub fn imm(value: i64) -> Self {
        Expr::Value(Value::Immediate(value))
    }

    /// Leaf variable.
    #[must_use]
    pub fn var(id: VarId) -> Self {
        Expr::Value(Value::Variable(id))
    }

    /// `target = value`
    #[must_use]
    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// `left op right`
    #[must_use]
    pub fn math(op: MathOp, left: Expr, right: Expr) -> Self {
        Expr::Math {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `*(address)`
    #[must_use]
    pub fn deref(address: Expr) -> Self {
        Expr::Deref(Box::new(address))
    }

    /// Returns the leaf value, if this node is one.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Expr::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the variable of a leaf variable node.
    #[must_use]
    pub fn as_variable(&self) -> Option<VarId> {
        self.as_value().and_then(Value::as_variable)
    }

    /// Returns the immediate of a leaf immediate node.
    #[must_use]
    pub fn as_immediate(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_immediate)
    }

    /// Returns `true` for statements rendered without a trailing `;`.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::If { .. } | Expr::Nop | Expr::Comment(_) | Expr::Unsupported(_)
        )
    }

    /// Rebuilds this tree bottom-up.
    ///
    /// Children are rewritten first (the assigned value before the assignment target),
    /// then `f` receives the rebuilt node and returns its replacement. Bodies of
    /// structured conditionals are rewritten statement by statement.
    pub fn rewrite<F>(self, f: &mut F) -> Expr
    where
        F: FnMut(Expr) -> Expr,
    {
        let rebuilt = match self {
            Expr::Assign { target, value } => {
                let value = Box::new((*value).rewrite(f));
                let target = Box::new((*target).rewrite(f));
                Expr::Assign { target, value }
            }
            Expr::Compare { kind, left, right } => Expr::Compare {
                kind,
                left: Box::new((*left).rewrite(f)),
                right: Box::new((*right).rewrite(f)),
            },
            Expr::Math { op, left, right } => Expr::Math {
                op,
                left: Box::new((*left).rewrite(f)),
                right: Box::new((*right).rewrite(f)),
            },
            Expr::Not(inner) => Expr::Not(Box::new((*inner).rewrite(f))),
            Expr::Deref(inner) => Expr::Deref(Box::new((*inner).rewrite(f))),
            Expr::MemberAccess { object, field } => Expr::MemberAccess {
                object: Box::new((*object).rewrite(f)),
                field,
            },
            Expr::If { condition, body } => {
                let condition = Box::new((*condition).rewrite(f));
                let body = match body {
                    IfBody::Block(mut block) => {
                        for statement in &mut block.statements {
                            statement.expr.rewrite_in_place(f);
                        }
                        IfBody::Block(block)
                    }
                    goto @ IfBody::Goto(_) => goto,
                };
                Expr::If { condition, body }
            }
            Expr::Call {
                target,
                arguments,
                returns,
            } => Expr::Call {
                target: Box::new((*target).rewrite(f)),
                arguments: arguments.into_iter().map(|arg| arg.rewrite(f)).collect(),
                returns,
            },
            Expr::Return(value) => Expr::Return(value.map(|v| Box::new((*v).rewrite(f)))),
            Expr::VectorAccess { vector, index } => Expr::VectorAccess {
                vector: Box::new((*vector).rewrite(f)),
                index,
            },
            leaf @ (Expr::Value(_)
            | Expr::Goto(_)
            | Expr::Nop
            | Expr::Unsupported(_)
            | Expr::Comment(_)) => leaf,
        };
        f(rebuilt)
    }

    /// Replaces `self` with the result of [`Expr::rewrite`].
    pub fn rewrite_in_place<F>(&mut self, f: &mut F)
    where
        F: FnMut(Expr) -> Expr,
    {
        let expr = std::mem::replace(self, Expr::Nop);
        *self = expr.rewrite(f);
    }

    /// Like [`Expr::rewrite_in_place`], except that a store through memory keeps its
    /// `Deref`: `f` sees the address below it and the assignment node, never the
    /// target's `Deref` itself.
    pub fn rewrite_loads_in_place<F>(&mut self, f: &mut F)
    where
        F: FnMut(Expr) -> Expr,
    {
        if let Expr::Assign { target, value } = &mut *self {
            if let Expr::Deref(address) = target.as_mut() {
                value.rewrite_in_place(f);
                address.rewrite_in_place(f);
                let store = std::mem::replace(self, Expr::Nop);
                *self = f(store);
                return;
            }
        }
        self.rewrite_in_place(f);
    }

    /// Visits this tree top-down, including bodies of structured conditionals.
    pub fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr),
    {
        f(self);
        match self {
            Expr::Assign { target, value } => {
                value.walk(f);
                target.walk(f);
            }
            Expr::Compare { left, right, .. } | Expr::Math { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::Not(inner) | Expr::Deref(inner) => inner.walk(f),
            Expr::MemberAccess { object, .. } => object.walk(f),
            Expr::VectorAccess { vector, .. } => vector.walk(f),
            Expr::If { condition, body } => {
                condition.walk(f);
                if let IfBody::Block(block) = body {
                    for statement in &block.statements {
                        statement.expr.walk(f);
                    }
                }
            }
            Expr::Call {
                target, arguments, ..
            } => {
                target.walk(f);
                for arg in arguments {
                    arg.walk(f);
                }
            }
            Expr::Return(value) => {
                if let Some(value) = value {
                    value.walk(f);
                }
            }
            Expr::Value(_) | Expr::Goto(_) | Expr::Nop | Expr::Unsupported(_) | Expr::Comment(_) => {}
        }
    }

    /// Returns `true` if any node of this tree satisfies `predicate`.
    pub fn any<P>(&self, mut predicate: P) -> bool
    where
        P: FnMut(&Expr) -> bool,
    {
        let mut found = false;
        self.walk(&mut |expr| found = found || predicate(expr));
        found
    }
}
