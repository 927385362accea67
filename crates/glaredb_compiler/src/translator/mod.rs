pub mod filter;
pub mod hash_aggregate;
pub mod limit;
pub mod output;
pub mod projection;
pub mod seq_scan;
pub mod sort;

use std::fmt::Debug;

use glaredb_error::Result;

use crate::ast::{Decl, FieldDecl, Stmt};
use crate::codegen::CodeGen;
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::Explainable;

/// Translates a single physical operator into code within a pipeline.
///
/// The pipeline only interacts with operators through this trait, it never
/// knows what kind of operator it's holding.
///
/// Contribution methods take `&self` and must produce the same output every
/// time they're called. Any identifiers needed across multiple phases should be
/// allocated when the translator is created.
pub trait OperatorTranslator: Explainable + Debug {
    /// If this operator can operate on batches of rows instead of one row at a
    /// time.
    fn is_vectorizable(&self) -> bool;

    /// If this operator can execute concurrently across independent partitions
    /// of its input without additional synchronization.
    fn is_parallelizable(&self) -> bool;

    /// Top-level declarations (structs, helper functions) this operator needs.
    fn initialize_declarations(&self, _codegen: &CodeGen, _decls: &mut Vec<Decl>) -> Result<()> {
        Ok(())
    }

    /// Fields this operator needs on the query state.
    fn initialize_state_fields(
        &self,
        _codegen: &CodeGen,
        _fields: &mut Vec<FieldDecl>,
    ) -> Result<()> {
        Ok(())
    }

    /// Statements to run once before any pipeline executes.
    fn initialize_setup(&self, _codegen: &CodeGen, _stmts: &mut Vec<Stmt>) -> Result<()> {
        Ok(())
    }

    /// Statements to run once after all pipelines have executed.
    fn initialize_teardown(&self, _codegen: &CodeGen, _stmts: &mut Vec<Stmt>) -> Result<()> {
        Ok(())
    }

    /// Emit the per-row (or per-batch) work for this operator.
    ///
    /// Pipeline sources are called first and typically open a loop over
    /// their input. Every other operator appends to the innermost open block,
    /// possibly opening further blocks of its own.
    fn produce(&self, codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()>;
}
