use glaredb_error::{DbError, Result};

use crate::ast::{Block, Expr, FieldDecl, FunctionDecl, Identifier, Stmt, Type};

/// Builds a single function out of nested blocks.
///
/// Translators for a pipeline each get a turn appending to the function. A
/// translator may open a nested block (a loop over some input, a filter
/// condition) and leave it open so that translators emitting after it append
/// inside. All blocks still open are closed when the function is finished.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: Identifier,
    params: Vec<FieldDecl>,
    ret: Type,
    /// Open blocks, the function body is always first.
    blocks: Vec<OpenBlock>,
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    stmts: Vec<Stmt>,
    /// Statements to append to the enclosing block after this one closes.
    epilogue: Vec<Stmt>,
}

#[derive(Debug)]
enum BlockKind {
    Body,
    If {
        condition: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        next: Option<Box<Stmt>>,
    },
}

impl OpenBlock {
    fn new(kind: BlockKind) -> Self {
        OpenBlock {
            kind,
            stmts: Vec::new(),
            epilogue: Vec::new(),
        }
    }
}

impl FunctionBuilder {
    pub fn new(name: Identifier, params: Vec<FieldDecl>, ret: Type) -> Self {
        FunctionBuilder {
            name,
            params,
            ret,
            blocks: vec![OpenBlock::new(BlockKind::Body)],
        }
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    /// Number of nested blocks currently open, not including the function
    /// body.
    pub fn depth(&self) -> usize {
        self.blocks.len() - 1
    }

    /// Append a statement to the innermost open block.
    pub fn append(&mut self, stmt: Stmt) {
        self.innermost().stmts.push(stmt);
    }

    /// Append a statement to the block enclosing the innermost open block,
    /// directly after the innermost block closes.
    ///
    /// If no nested block is open, the statement is appended to the end of the
    /// function body.
    pub fn defer(&mut self, stmt: Stmt) {
        self.innermost().epilogue.push(stmt);
    }

    /// Open an `if` block, subsequent statements will be appended inside it.
    pub fn start_if(&mut self, condition: Expr) {
        self.blocks.push(OpenBlock::new(BlockKind::If { condition }));
    }

    /// Open a `for` block, subsequent statements will be appended inside it.
    pub fn start_for(&mut self, init: Option<Stmt>, condition: Option<Expr>, next: Option<Stmt>) {
        self.blocks.push(OpenBlock::new(BlockKind::For {
            init: init.map(Box::new),
            condition,
            next: next.map(Box::new),
        }));
    }

    /// Close the innermost nested block.
    ///
    /// Errors if only the function body is open.
    pub fn finish_block(&mut self) -> Result<()> {
        if self.blocks.len() == 1 {
            return Err(DbError::new("Cannot close function body block")
                .with_field("function", &self.name));
        }

        // Checked above.
        let block = self.blocks.pop().expect("nested block to exist");
        let stmt = match block.kind {
            BlockKind::If { condition } => Stmt::If {
                condition,
                then: Block::new(block.stmts),
                otherwise: None,
            },
            BlockKind::For {
                init,
                condition,
                next,
            } => Stmt::For {
                init,
                condition,
                next,
                body: Block::new(block.stmts),
            },
            BlockKind::Body => {
                return Err(DbError::new("Function body found in nested block position")
                    .with_field("function", &self.name));
            }
        };

        let parent = self.innermost();
        parent.stmts.push(stmt);
        parent.stmts.extend(block.epilogue);

        Ok(())
    }

    /// Close all open blocks and produce the function declaration.
    pub fn finish(mut self) -> Result<FunctionDecl> {
        while self.depth() > 0 {
            self.finish_block()?;
        }

        // Only the body remains.
        let mut body = self.blocks.pop().expect("function body to exist");
        body.stmts.extend(body.epilogue);

        Ok(FunctionDecl {
            name: self.name,
            params: self.params,
            ret: self.ret,
            body: Block::new(body.stmts),
        })
    }

    fn innermost(&mut self) -> &mut OpenBlock {
        // Body is never popped outside of `finish`.
        self.blocks.last_mut().expect("function body to exist")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::codegen::CodeGen;

    fn new_builder(codegen: &CodeGen) -> FunctionBuilder {
        FunctionBuilder::new(
            codegen.identifier("f"),
            codegen.pipeline_params(),
            Type::Nil,
        )
    }

    #[test]
    fn empty_function() {
        let codegen = CodeGen::default();
        let func = new_builder(&codegen).finish().unwrap();

        assert!(func.body.is_empty());
        assert_eq!("fun f(state: *State) -> nil {}", func.to_string());
    }

    #[test]
    fn nested_blocks_closed_on_finish() {
        let codegen = CodeGen::default();
        let mut builder = new_builder(&codegen);
        let x = codegen.identifier("x");

        builder.start_for(None, Some(Expr::builtin("hasNext", [])), None);
        builder.append(Stmt::declare(&x, None, Some(Expr::builtin("next", []))));
        builder.start_if(Expr::binary(
            BinaryOperator::Gt,
            Expr::ident(&x),
            Expr::Int(4),
        ));
        builder.append(Stmt::Expr(Expr::builtin("emit", [Expr::ident(&x)])));
        assert_eq!(2, builder.depth());

        let func = builder.finish().unwrap();
        let expected = "\
fun f(state: *State) -> nil {
    for (@hasNext()) {
        var x = @next()
        if (x > 4) {
            @emit(x)
        }
    }
}";
        assert_eq!(expected, func.to_string());
    }

    #[test]
    fn deferred_statement_after_block() {
        let codegen = CodeGen::default();
        let mut builder = new_builder(&codegen);

        builder.append(Stmt::Expr(Expr::builtin("open", [])));
        builder.start_for(None, Some(Expr::builtin("advance", [])), None);
        builder.defer(Stmt::Expr(Expr::builtin("close", [])));
        builder.append(Stmt::Expr(Expr::builtin("work", [])));

        builder.finish_block().unwrap();
        builder.append(Stmt::Return(None));

        let func = builder.finish().unwrap();
        let expected = "\
fun f(state: *State) -> nil {
    @open()
    for (@advance()) {
        @work()
    }
    @close()
    return
}";
        assert_eq!(expected, func.to_string());
    }

    #[test]
    fn deferred_on_body_appended_last() {
        let codegen = CodeGen::default();
        let mut builder = new_builder(&codegen);

        builder.defer(Stmt::Expr(Expr::builtin("last", [])));
        builder.append(Stmt::Expr(Expr::builtin("first", [])));

        let func = builder.finish().unwrap();
        let stmts: Vec<_> = func.body.stmts.iter().map(|s| s.to_string()).collect();
        assert_eq!(vec!["@first()", "@last()"], stmts);
    }

    #[test]
    fn finish_body_block_errors() {
        let codegen = CodeGen::default();
        let mut builder = new_builder(&codegen);
        builder.finish_block().unwrap_err();
    }
}
