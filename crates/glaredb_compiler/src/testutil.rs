//! Utilities for testing pipeline compilation.

use glaredb_error::{DbError, Result};

use crate::ast::{Decl, Expr, FieldDecl, Stmt, StructDecl, Type};
use crate::codegen::CodeGen;
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::translator::OperatorTranslator;

/// Run a single translator's `produce` in an otherwise empty function and
/// render the result.
pub fn produce_to_string(codegen: &CodeGen, translator: &dyn OperatorTranslator) -> String {
    let mut builder = FunctionBuilder::new(
        codegen.identifier("test"),
        codegen.pipeline_params(),
        Type::Nil,
    );
    translator.produce(codegen, &mut builder).unwrap();
    builder.finish().unwrap().to_string()
}

/// Translator with configurable capabilities and contributions.
///
/// Every contribution is tagged with the translator's name so that ordering
/// can be checked in the output.
#[derive(Debug, Clone)]
pub struct MockTranslator {
    pub name: String,
    pub vectorizable: bool,
    pub parallelizable: bool,
    pub num_decls: usize,
    pub num_state_fields: usize,
    pub num_setup: usize,
    pub num_teardown: usize,
    /// Open a block when producing.
    pub open_block: bool,
    /// Fail when producing.
    pub fail_produce: bool,
    /// Fail after contributing state fields.
    pub fail_initialize: bool,
}

impl MockTranslator {
    pub fn new(name: impl Into<String>) -> Self {
        MockTranslator {
            name: name.into(),
            vectorizable: true,
            parallelizable: true,
            num_decls: 0,
            num_state_fields: 0,
            num_setup: 0,
            num_teardown: 0,
            open_block: false,
            fail_produce: false,
            fail_initialize: false,
        }
    }

    pub fn with_flags(mut self, vectorizable: bool, parallelizable: bool) -> Self {
        self.vectorizable = vectorizable;
        self.parallelizable = parallelizable;
        self
    }

    pub fn with_contributions(
        mut self,
        decls: usize,
        state_fields: usize,
        setup: usize,
        teardown: usize,
    ) -> Self {
        self.num_decls = decls;
        self.num_state_fields = state_fields;
        self.num_setup = setup;
        self.num_teardown = teardown;
        self
    }

    pub fn with_open_block(mut self) -> Self {
        self.open_block = true;
        self
    }

    pub fn with_fail_produce(mut self) -> Self {
        self.fail_produce = true;
        self
    }

    pub fn with_fail_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn boxed(self) -> Box<dyn OperatorTranslator> {
        Box::new(self)
    }

    fn tagged_call(&self, kind: &'static str, idx: usize) -> Stmt {
        Stmt::Expr(Expr::builtin(
            kind,
            [Expr::String(self.name.clone()), Expr::Int(idx as i64)],
        ))
    }
}

impl Explainable for MockTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new(format!("Mock {}", self.name))
    }
}

impl OperatorTranslator for MockTranslator {
    fn is_vectorizable(&self) -> bool {
        self.vectorizable
    }

    fn is_parallelizable(&self) -> bool {
        self.parallelizable
    }

    fn initialize_declarations(&self, codegen: &CodeGen, decls: &mut Vec<Decl>) -> Result<()> {
        for idx in 0..self.num_decls {
            decls.push(Decl::Struct(StructDecl {
                name: codegen.identifier(&format!("{}_decl{idx}", self.name)),
                fields: Vec::new(),
            }));
        }
        Ok(())
    }

    fn initialize_state_fields(
        &self,
        codegen: &CodeGen,
        fields: &mut Vec<FieldDecl>,
    ) -> Result<()> {
        for idx in 0..self.num_state_fields {
            fields.push(FieldDecl::new(
                &codegen.identifier(&format!("{}_field{idx}", self.name)),
                Type::Int64,
            ));
        }
        if self.fail_initialize {
            return Err(DbError::new(format!(
                "Mock '{}' failed to initialize",
                self.name
            )));
        }
        Ok(())
    }

    fn initialize_setup(&self, _codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.extend((0..self.num_setup).map(|idx| self.tagged_call("setup", idx)));
        Ok(())
    }

    fn initialize_teardown(&self, _codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.extend((0..self.num_teardown).map(|idx| self.tagged_call("teardown", idx)));
        Ok(())
    }

    fn produce(&self, _codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        if self.fail_produce {
            return Err(DbError::new(format!(
                "Mock '{}' failed to produce",
                self.name
            )));
        }

        builder.append(self.tagged_call("work", 0));
        if self.open_block {
            builder.start_if(Expr::String(self.name.clone()));
        }
        Ok(())
    }
}
