//! Pseudo-source emission.
//!
//! Lifted blocks render to C#-like text through an [`Output`] sink. Every piece of text is
//! tagged with a [`TextKind`] so hosts can colorize it; [`TextBuffer`] is the provided sink
//! and keeps both the plain text and the tagged spans.
//!
//! # Format
//!
//! - A top-level block that is the target of at least one jump starts with a dedented
//!   `ISIL_<start>:` label
//! - Statements end with `;`, except conditionals, comments and placeholders
//! - `if (cond)` is followed by an indented `goto` or a braced nested block
//! - Eliminated statements and no-ops are not written
//!
//! # Example
//!
//! ```rust
//! use isilift::lifter::{Output, TextBuffer, TextKind};
//!
//! let mut out = TextBuffer::new();
//! out.write("return", TextKind::Keyword);
//! out.write(";", TextKind::Punctuation);
//! out.write_line();
//! assert_eq!(out.text(), "return;\n");
//! assert_eq!(out.spans().len(), 2);
//! ```

use strum::{Display, EnumIter};

use crate::{
    isil::{Instruction, Operand},
    lifter::ir::{Block, Expr, IfBody, Value, VariableTable},
    program::MetadataUsage,
};

/// Semantic category of a piece of emitted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum TextKind {
    /// Untagged text such as spaces
    Plain,
    /// Language keyword
    Keyword,
    /// Type name
    Type,
    /// Local variable
    Local,
    /// Machine register
    Register,
    /// Method or runtime helper name
    Method,
    /// Field name
    Field,
    /// Numeric literal
    Number,
    /// String literal
    String,
    /// Jump label
    Label,
    /// Operators, brackets and separators
    Punctuation,
    /// Comment or placeholder text
    Comment,
    /// Instruction index in a raw listing
    Address,
    /// Instruction mnemonic in a raw listing
    Mnemonic,
}

/// A sink for tagged text.
pub trait Output {
    /// Appends `text` tagged as `kind`.
    fn write(&mut self, text: &str, kind: TextKind);

    /// Ends the current line.
    fn write_line(&mut self);

    /// Indents following lines one level deeper.
    fn increase_indent(&mut self);

    /// Indents following lines one level shallower; never goes below zero.
    fn decrease_indent(&mut self);
}

/// A tagged run of text recorded by [`TextBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// The text
    pub text: String,
    /// Its category
    pub kind: TextKind,
}

/// In-memory [`Output`] that keeps plain text and tagged spans.
///
/// Indentation is four spaces per level and is written to the text only, not recorded
/// as a span.
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    text: String,
    spans: Vec<Span>,
    indent: usize,
    at_line_start: bool,
}

impl TextBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        TextBuffer {
            text: String::new(),
            spans: Vec::new(),
            indent: 0,
            at_line_start: true,
        }
    }

    /// Returns the plain text written so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the tagged spans written so far, without line breaks and indentation.
    #[must_use]
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Consumes the buffer, returning its plain text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

impl Output for TextBuffer {
    fn write(&mut self, text: &str, kind: TextKind) {
        if text.is_empty() {
            return;
        }
        if self.at_line_start {
            for _ in 0..self.indent {
                self.text.push_str("    ");
            }
            self.at_line_start = false;
        }
        self.text.push_str(text);
        match self.spans.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(text),
            _ => self.spans.push(Span {
                text: text.to_string(),
                kind,
            }),
        }
    }

    fn write_line(&mut self) {
        self.text.push('\n');
        self.at_line_start = true;
    }

    fn increase_indent(&mut self) {
        self.indent += 1;
    }

    fn decrease_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }
}

/// Returns the text of a jump label.
#[must_use]
pub fn label(start: usize) -> String {
    format!("ISIL_{start}")
}

/// Formats a literal the way listings show it: decimal up to `0xFFFF`, hex above.
#[must_use]
pub fn number(value: i64) -> String {
    let magnitude = value.unsigned_abs();
    match (magnitude > 0xFFFF, value < 0) {
        (true, true) => format!("-0x{magnitude:X}"),
        (true, false) => format!("0x{magnitude:X}"),
        (false, _) => value.to_string(),
    }
}

/// Quotes and escapes a string literal C-style.
#[must_use]
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\0' => quoted.push_str("\\0"),
            c if c.is_control() => quoted.push_str(&format!("\\x{:02X}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Writes expressions of one method, resolving variable names through its table.
pub struct Writer<'o> {
    out: &'o mut dyn Output,
    variables: &'o VariableTable,
}

impl<'o> Writer<'o> {
    /// Creates a writer over `out` for a method whose variables are `variables`.
    pub fn new(out: &'o mut dyn Output, variables: &'o VariableTable) -> Self {
        Writer { out, variables }
    }

    fn text(&mut self, text: &str, kind: TextKind) {
        self.out.write(text, kind);
    }

    fn punct(&mut self, text: &str) {
        self.out.write(text, TextKind::Punctuation);
    }

    /// Writes a block: its label when referenced and `top_level`, then its live statements.
    pub fn block(&mut self, block: &Block, top_level: bool) {
        if top_level && block.references > 0 {
            self.out.decrease_indent();
            self.text(&label(block.start), TextKind::Label);
            self.punct(":");
            self.out.write_line();
            self.out.increase_indent();
        }
        for statement in block.live_statements() {
            self.statement(&statement.expr);
        }
    }

    /// Writes one statement followed by a line break.
    pub fn statement(&mut self, expr: &Expr) {
        match expr {
            Expr::Nop => {}
            Expr::If { condition, body } => {
                self.text("if", TextKind::Keyword);
                self.punct(" (");
                self.expr(condition);
                self.punct(")");
                self.out.write_line();
                match body {
                    IfBody::Goto(target) => {
                        self.out.increase_indent();
                        self.goto(*target);
                        self.punct(";");
                        self.out.write_line();
                        self.out.decrease_indent();
                    }
                    IfBody::Block(block) => {
                        self.punct("{");
                        self.out.write_line();
                        self.out.increase_indent();
                        self.block(block, false);
                        self.out.decrease_indent();
                        self.punct("}");
                        self.out.write_line();
                    }
                }
            }
            other => {
                self.expr(other);
                if !other.is_compound() {
                    self.punct(";");
                }
                self.out.write_line();
            }
        }
    }

    fn goto(&mut self, target: usize) {
        self.text("goto", TextKind::Keyword);
        self.text(" ", TextKind::Plain);
        self.text(&label(target), TextKind::Label);
    }

    /// Writes `expr` in parentheses when it is an infix expression.
    fn operand(&mut self, expr: &Expr) {
        if matches!(expr, Expr::Math { .. } | Expr::Compare { .. } | Expr::Assign { .. }) {
            self.punct("(");
            self.expr(expr);
            self.punct(")");
        } else {
            self.expr(expr);
        }
    }

    fn arguments(&mut self, arguments: &[Expr]) {
        self.punct("(");
        for (i, argument) in arguments.iter().enumerate() {
            if i > 0 {
                self.punct(", ");
            }
            self.expr(argument);
        }
        self.punct(")");
    }

    /// Writes an expression without a trailing terminator.
    pub fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Value(value) => self.value(value),
            Expr::Assign { target, value } => {
                self.expr(target);
                self.punct(" = ");
                self.expr(value);
            }
            Expr::Compare { kind, left, right } => match kind.operator() {
                Some(operator) => {
                    self.operand(left);
                    self.punct(operator);
                    self.operand(right);
                }
                None => {
                    self.text("__compare__", TextKind::Method);
                    self.punct("(");
                    self.expr(left);
                    self.punct(", ");
                    self.expr(right);
                    self.punct(")");
                }
            },
            Expr::Math { op, left, right } => {
                self.operand(left);
                self.punct(op.operator());
                self.operand(right);
            }
            Expr::Not(inner) => {
                let logical = matches!(**inner, Expr::Compare { .. } | Expr::Unsupported(_));
                self.punct(if logical { "!(" } else { "~(" });
                self.expr(inner);
                self.punct(")");
            }
            Expr::Deref(inner) => {
                self.punct("*(");
                self.expr(inner);
                self.punct(")");
            }
            Expr::MemberAccess { object, field } => {
                self.operand(object);
                self.punct(".");
                self.text(&field.name, TextKind::Field);
            }
            Expr::If { condition, body } => {
                // only reached for nested conditionals rendered inline
                self.text("if", TextKind::Keyword);
                self.punct(" (");
                self.expr(condition);
                self.punct(") ");
                match body {
                    IfBody::Goto(target) => self.goto(*target),
                    IfBody::Block(block) => {
                        self.punct("{ ");
                        self.text(&label(block.start), TextKind::Label);
                        self.punct(" }");
                    }
                }
            }
            Expr::Goto(target) => self.goto(*target),
            Expr::Call {
                target,
                arguments,
                returns,
            } => self.call(target, arguments, *returns),
            Expr::Return(value) => {
                self.text("return", TextKind::Keyword);
                if let Some(value) = value {
                    self.text(" ", TextKind::Plain);
                    self.expr(value);
                }
            }
            Expr::VectorAccess { vector, index } => {
                self.expr(vector);
                self.punct("[");
                self.text(&index.to_string(), TextKind::Number);
                self.punct("]");
            }
            Expr::Nop => {}
            Expr::Unsupported(text) | Expr::Comment(text) => {
                self.text(&format!("/* {text} */"), TextKind::Comment);
            }
        }
    }

    fn delegate(&mut self, arity: usize, returns: bool) {
        self.punct("((");
        self.text("delegate* unmanaged", TextKind::Keyword);
        self.punct("<");
        for _ in 0..arity {
            self.text("nint", TextKind::Type);
            self.punct(", ");
        }
        self.text(if returns { "nint" } else { "void" }, TextKind::Type);
        self.punct(">)");
    }

    fn call(&mut self, target: &Expr, arguments: &[Expr], returns: bool) {
        match target.as_value() {
            Some(Value::ManagedFunction(method)) => match arguments.split_first() {
                Some((receiver, rest)) if !method.is_static => {
                    self.operand(receiver);
                    self.punct(".");
                    self.text(&method.name, TextKind::Method);
                    self.arguments(rest);
                }
                _ => {
                    self.text(&method.declaring_type_name, TextKind::Type);
                    self.punct(".");
                    self.text(&method.name, TextKind::Method);
                    self.arguments(arguments);
                }
            },
            Some(Value::KnownFunction(function)) => {
                self.text(&function.to_string(), TextKind::Method);
                self.arguments(arguments);
            }
            Some(Value::UnmanagedFunction(address)) => {
                self.delegate(arguments.len(), returns);
                self.text(&format!("0x{address:X}"), TextKind::Number);
                self.punct(")");
                self.arguments(arguments);
            }
            _ => {
                self.delegate(arguments.len(), returns);
                self.expr(target);
                self.punct(")");
                self.arguments(arguments);
            }
        }
    }

    fn value(&mut self, value: &Value) {
        match value {
            Value::Register(name) => self.text(name, TextKind::Register),
            Value::Variable(id) => match self.variables.get(*id) {
                Some(variable) if !variable.name.is_empty() => {
                    let kind = if variable.is_keyword {
                        TextKind::Keyword
                    } else {
                        TextKind::Local
                    };
                    self.text(&variable.name, kind);
                }
                _ => self.text(&id.to_string(), TextKind::Local),
            },
            Value::Immediate(value) => self.text(&number(*value), TextKind::Number),
            Value::Label(index) => self.text(&label(*index), TextKind::Label),
            Value::LoadString(text) => self.text(&quote(text), TextKind::String),
            Value::ManagedFunction(method) => {
                self.text(&method.declaring_type_name, TextKind::Type);
                self.punct(".");
                self.text(&method.name, TextKind::Method);
            }
            Value::UnmanagedFunction(address) => {
                self.text(&format!("0x{address:X}"), TextKind::Number);
            }
            Value::KnownFunction(function) => self.text(&function.to_string(), TextKind::Method),
            Value::Metadata(usage) => self.metadata(usage),
        }
    }

    fn metadata(&mut self, usage: &MetadataUsage) {
        let (keyword, kind, name) = match usage {
            MetadataUsage::Type { name, .. } => ("typeof", TextKind::Type, name.clone()),
            MetadataUsage::MethodDef(method) => ("__methoddef__", TextKind::Method, method.to_string()),
            MetadataUsage::MethodRef(name) => ("__methodref__", TextKind::Method, name.clone()),
            MetadataUsage::FieldRef(field) => (
                "__fieldref__",
                TextKind::Field,
                format!("{}.{}", field.declaring_type_name, field.name),
            ),
            MetadataUsage::StringLiteral(text) => {
                self.text(&quote(text), TextKind::String);
                return;
            }
        };
        self.text(keyword, TextKind::Keyword);
        self.punct("(");
        self.text(&name, kind);
        self.punct(")");
    }
}

impl Block {
    /// Writes this block as pseudo-source, with its label if it is referenced.
    pub fn write(&self, out: &mut dyn Output, variables: &VariableTable) {
        Writer::new(out, variables).block(self, true);
    }
}

/// Writes a raw instruction listing, one instruction per line.
pub fn write_listing(out: &mut dyn Output, instructions: &[Instruction]) {
    for instruction in instructions {
        out.write(&format!("{:03}", instruction.index), TextKind::Address);
        out.write(" ", TextKind::Plain);
        out.write(&instruction.mnemonic.to_string(), TextKind::Mnemonic);
        for (i, operand) in instruction.operands.iter().enumerate() {
            out.write(if i == 0 { " " } else { ", " }, TextKind::Punctuation);
            let kind = match operand {
                Operand::Register(_) => TextKind::Register,
                Operand::Immediate(_) => TextKind::Number,
                Operand::Instruction(_) => TextKind::Label,
                Operand::Method(_) | Operand::KeyFunction(_) => TextKind::Method,
                _ => TextKind::Plain,
            };
            out.write(&operand.to_string(), kind);
        }
        out.write_line();
    }
}

/// Renders a single expression to plain text.
#[must_use]
pub fn render(expr: &Expr, variables: &VariableTable) -> String {
    let mut buffer = TextBuffer::new();
    Writer::new(&mut buffer, variables).expr(expr);
    buffer.into_text()
}
