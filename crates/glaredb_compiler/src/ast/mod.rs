//! Minimal program representation that pipelines are compiled into.
//!
//! Rendering (via `Display`) produces a small TPL-like language. The renderer
//! is only used for tests and explain output, the runtime consumes the tree
//! directly.

pub mod display;

use std::fmt;
use std::sync::Arc;

/// A name in the generated program.
///
/// Cheap to clone. Should only be created through the `CodeGen` context to
/// guarantee uniqueness where required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Arc<str>);

impl Identifier {
    pub(crate) fn new(name: impl Into<Arc<str>>) -> Self {
        Identifier(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Nil,
    Bool,
    Int32,
    Int64,
    Float64,
    /// A struct declared in the program, or a type provided by the runtime
    /// (e.g. `Sorter`).
    Named(Identifier),
    Pointer(Box<Type>),
}

impl Type {
    pub fn named(ident: &Identifier) -> Self {
        Type::Named(ident.clone())
    }

    pub fn pointer_to(ty: Type) -> Self {
        Type::Pointer(Box::new(ty))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "and",
            Self::Or => "or",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Ident(Identifier),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    /// Call a function declared in the program.
    Call { func: Identifier, args: Vec<Expr> },
    /// Call a function provided by the runtime, rendered as `@name(args)`.
    Builtin {
        name: &'static str,
        args: Vec<Expr>,
    },
    Field {
        object: Box<Expr>,
        field: Identifier,
    },
    AddressOf(Box<Expr>),
}

impl Expr {
    pub fn ident(ident: &Identifier) -> Self {
        Expr::Ident(ident.clone())
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(func: &Identifier, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Call {
            func: func.clone(),
            args: args.into_iter().collect(),
        }
    }

    pub fn builtin(name: &'static str, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Builtin {
            name,
            args: args.into_iter().collect(),
        }
    }

    pub fn field(self, field: &Identifier) -> Self {
        Expr::Field {
            object: Box::new(self),
            field: field.clone(),
        }
    }

    pub fn address_of(self) -> Self {
        Expr::AddressOf(Box::new(self))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Block { stmts }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `var name: ty = init`
    ///
    /// At least one of `ty` or `init` should be provided.
    Declare {
        name: Identifier,
        ty: Option<Type>,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Expr(Expr),
    If {
        condition: Expr,
        then: Block,
        otherwise: Option<Block>,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        next: Option<Box<Stmt>>,
        body: Block,
    },
    Return(Option<Expr>),
}

impl Stmt {
    pub fn declare(name: &Identifier, ty: Option<Type>, init: Option<Expr>) -> Self {
        Stmt::Declare {
            name: name.clone(),
            ty,
            init,
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Assign { target, value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Identifier,
    pub ty: Type,
}

impl FieldDecl {
    pub fn new(name: &Identifier, ty: Type) -> Self {
        FieldDecl {
            name: name.clone(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: Identifier,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Identifier,
    pub params: Vec<FieldDecl>,
    pub ret: Type,
    pub body: Block,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Struct(StructDecl),
    Function(FunctionDecl),
}

impl Decl {
    pub fn name(&self) -> &Identifier {
        match self {
            Self::Struct(s) => &s.name,
            Self::Function(f) => &f.name,
        }
    }

    pub fn try_as_function(&self) -> Option<&FunctionDecl> {
        match self {
            Self::Function(f) => Some(f),
            Self::Struct(_) => None,
        }
    }
}

impl From<StructDecl> for Decl {
    fn from(value: StructDecl) -> Self {
        Decl::Struct(value)
    }
}

impl From<FunctionDecl> for Decl {
    fn from(value: FunctionDecl) -> Self {
        Decl::Function(value)
    }
}
