use std::fmt;

use super::{Block, Decl, Expr, FieldDecl, FunctionDecl, Stmt, StructDecl, Type};

const INDENT: &str = "    ";

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool => write!(f, "bool"),
            Self::Int32 => write!(f, "int32"),
            Self::Int64 => write!(f, "int64"),
            Self::Float64 => write!(f, "float64"),
            Self::Named(ident) => write!(f, "{ident}"),
            Self::Pointer(inner) => write!(f, "*{inner}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Ident(ident) => write!(f, "{ident}"),
            Self::Binary { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right)
            }
            Self::Not(expr) => {
                write!(f, "!")?;
                write_operand(f, expr)
            }
            Self::Call { func, args } => {
                write!(f, "{func}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Self::Builtin { name, args } => {
                write!(f, "@{name}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Self::Field { object, field } => {
                write_operand(f, object)?;
                write!(f, ".{field}")
            }
            Self::AddressOf(expr) => {
                write!(f, "&")?;
                write_operand(f, expr)
            }
        }
    }
}

/// Write an expression that's nested inside of another expression, wrapping
/// it in parens if needed.
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    match expr {
        Expr::Binary { .. } | Expr::Not(_) => write!(f, "({expr})"),
        _ => write!(f, "{expr}"),
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for FieldDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_stmt(f, self, 0)
    }
}

impl fmt::Display for Decl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Struct(s) => write!(f, "{s}"),
            Self::Function(func) => write!(f, "{func}"),
        }
    }
}

impl fmt::Display for StructDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "struct {} {{", self.name)?;
        for field in &self.fields {
            writeln!(f, "{INDENT}{field}")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fun {}(", self.name)?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {} ", self.ret)?;
        write_block(f, &self.body, 0)
    }
}

fn write_indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        write!(f, "{INDENT}")?;
    }
    Ok(())
}

/// Writes "{ ... }" with the closing brace indented to `depth`.
fn write_block(f: &mut fmt::Formatter<'_>, block: &Block, depth: usize) -> fmt::Result {
    if block.is_empty() {
        return write!(f, "{{}}");
    }

    writeln!(f, "{{")?;
    for stmt in &block.stmts {
        write_indent(f, depth + 1)?;
        write_stmt(f, stmt, depth + 1)?;
        writeln!(f)?;
    }
    write_indent(f, depth)?;
    write!(f, "}}")
}

/// Write a statement assuming the cursor is already indented to `depth`.
fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
    match stmt {
        Stmt::Declare { name, ty, init } => {
            write!(f, "var {name}")?;
            if let Some(ty) = ty {
                write!(f, ": {ty}")?;
            }
            if let Some(init) = init {
                write!(f, " = {init}")?;
            }
            Ok(())
        }
        Stmt::Assign { target, value } => write!(f, "{target} = {value}"),
        Stmt::Expr(expr) => write!(f, "{expr}"),
        Stmt::If {
            condition,
            then,
            otherwise,
        } => {
            write!(f, "if ({condition}) ")?;
            write_block(f, then, depth)?;
            if let Some(otherwise) = otherwise {
                write!(f, " else ")?;
                write_block(f, otherwise, depth)?;
            }
            Ok(())
        }
        Stmt::For {
            init,
            condition,
            next,
            body,
        } => {
            match (init, condition, next) {
                (None, None, None) => write!(f, "for ")?,
                (None, Some(condition), None) => write!(f, "for ({condition}) ")?,
                (init, condition, next) => {
                    write!(f, "for (")?;
                    if let Some(init) = init {
                        write_stmt(f, init, depth)?;
                    }
                    write!(f, "; ")?;
                    if let Some(condition) = condition {
                        write!(f, "{condition}")?;
                    }
                    write!(f, "; ")?;
                    if let Some(next) = next {
                        write_stmt(f, next, depth)?;
                    }
                    write!(f, ") ")?;
                }
            }
            write_block(f, body, depth)
        }
        Stmt::Return(None) => write!(f, "return"),
        Stmt::Return(Some(expr)) => write!(f, "return {expr}"),
    }
}
