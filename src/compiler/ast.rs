//! Abstract syntax tree for the Cinder language.
//!
//! Every node carries a [`FileRange`] so diagnostics can point back into the
//! source. Statement lists are reference-counted because file scopes, module
//! constants and declaration scopes all share the same parsed statements.

use crate::compiler::span::FileRange;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

// ═══════════════════════════════════════════════════════════════
//  Identifiers
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    pub text: String,
    pub range: FileRange,
}

// ═══════════════════════════════════════════════════════════════
//  Expressions
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub range: FileRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpressionKind {
    NamedReference(Identifier),
    MemberReference {
        expression: Box<Expression>,
        name: Identifier,
    },
    IndexReference {
        expression: Box<Expression>,
        index: Box<Expression>,
    },
    IntegerLiteral(u64),
    FloatLiteral(f64),
    StringLiteral(String),
    ArrayLiteral(Vec<Expression>),
    StructLiteral(Vec<StructLiteralMember>),
    FunctionCall {
        expression: Box<Expression>,
        parameters: Vec<Expression>,
    },
    BinaryOperation {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    UnaryOperation {
        operator: UnaryOperator,
        expression: Box<Expression>,
    },
    Cast {
        expression: Box<Expression>,
        target: Box<Expression>,
    },
    /// `[]T` when `length` is absent, `[N]T` when present.
    ArrayType {
        element: Box<Expression>,
        length: Option<Box<Expression>>,
    },
    FunctionType {
        parameters: Vec<FunctionParameter>,
        return_type: Option<Box<Expression>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructLiteralMember {
    pub name: Identifier,
    pub value: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    BitwiseAnd,
    BitwiseOr,
    BooleanAnd,
    BooleanOr,
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            BinaryOperator::Addition => "+",
            BinaryOperator::Subtraction => "-",
            BinaryOperator::Multiplication => "*",
            BinaryOperator::Division => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::BitwiseAnd => "&",
            BinaryOperator::BitwiseOr => "|",
            BinaryOperator::BooleanAnd => "&&",
            BinaryOperator::BooleanOr => "||",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// Prefix `*`: pointer type on a type operand, address-of on an lvalue.
    Pointer,
    /// Prefix `^`: pointer dereference.
    PointerDereference,
    /// Prefix `!`.
    BooleanInvert,
    /// Prefix `-`.
    Negation,
}

// ═══════════════════════════════════════════════════════════════
//  Function parameters
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionParameter {
    pub name: Identifier,
    pub kind: ParameterKind,
    /// `$x: T`: the argument must be a compile-time constant and is bound
    /// as a constant parameter in the callee's scope.
    pub is_constant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParameterKind {
    /// `x: T`, with the type an expression evaluated at resolution time.
    Typed(Expression),
    /// `x: $T`, with the type inferred from the argument at each call site,
    /// binding `T` as a constant parameter.
    PolymorphicDeterminer(Identifier),
}

// ═══════════════════════════════════════════════════════════════
//  Statements
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub range: FileRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    FunctionDeclaration(FunctionDeclaration),
    ConstantDefinition {
        name: Identifier,
        expression: Expression,
    },
    StructDefinition(StructDefinition),
    VariableDeclaration {
        name: Identifier,
        type_expression: Option<Expression>,
        initializer: Option<Expression>,
    },
    Assignment {
        target: Expression,
        value: Expression,
    },
    If {
        condition: Expression,
        statements: Rc<Vec<Rc<Statement>>>,
        else_ifs: Vec<ElseIf>,
        else_statements: Rc<Vec<Rc<Statement>>>,
    },
    While {
        condition: Expression,
        statements: Rc<Vec<Rc<Statement>>>,
    },
    Return {
        value: Option<Expression>,
    },
    ExpressionStatement(Expression),
    Import {
        path: String,
    },
    Using {
        value: Expression,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElseIf {
    pub condition: Expression,
    pub statements: Rc<Vec<Rc<Statement>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: Identifier,
    pub parameters: Vec<FunctionParameter>,
    pub return_type: Option<Expression>,
    pub statements: Rc<Vec<Rc<Statement>>>,
    pub is_external: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDefinition {
    pub name: Identifier,
    /// Non-empty for polymorphic structs: `Vec :: struct (T: type) { ... }`.
    pub parameters: Vec<StructParameter>,
    pub members: Vec<StructMemberDeclaration>,
    pub is_union: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructParameter {
    pub name: Identifier,
    pub type_expression: Expression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructMemberDeclaration {
    pub name: Identifier,
    pub type_expression: Expression,
}

impl Statement {
    /// The name this statement binds in its scope, if it is a declaration.
    /// Imports are named after the file stem of the imported path.
    pub fn declaration_name(&self) -> Option<&str> {
        match &self.kind {
            StatementKind::FunctionDeclaration(declaration) => Some(&declaration.name.text),
            StatementKind::ConstantDefinition { name, .. } => Some(&name.text),
            StatementKind::StructDefinition(definition) => Some(&definition.name.text),
            StatementKind::Import { path } => Some(crate::compiler::modules::file_stem(path)),
            _ => None,
        }
    }

    /// Whether the statement matches `name` for resolution from inside the
    /// owning scope (imports participate).
    pub fn matches_declaration(&self, name: &str) -> bool {
        self.declaration_name() == Some(name)
    }

    /// Whether the statement matches `name` when reached through a module
    /// boundary: everything except imports is public.
    pub fn matches_public_declaration(&self, name: &str) -> bool {
        !matches!(self.kind, StatementKind::Import { .. }) && self.matches_declaration(name)
    }
}
