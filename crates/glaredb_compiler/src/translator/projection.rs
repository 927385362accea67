use glaredb_error::{DbError, Result};

use crate::ast::{Expr, Identifier, Stmt};
use crate::codegen::CodeGen;
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::translator::OperatorTranslator;

/// Evaluates expressions for every row, binding each result to a variable.
#[derive(Debug)]
pub struct ProjectionTranslator {
    columns: Vec<(Identifier, Expr)>,
}

impl ProjectionTranslator {
    /// Create a projection from (name, expression) pairs.
    ///
    /// Names are only a hint, the resulting variables are always unique.
    pub fn new<'a>(
        codegen: &CodeGen,
        columns: impl IntoIterator<Item = (&'a str, Expr)>,
    ) -> Result<Self> {
        let columns: Vec<_> = columns
            .into_iter()
            .map(|(name, expr)| (codegen.new_identifier(name), expr))
            .collect();

        if columns.is_empty() {
            return Err(DbError::new("Projection requires at least one column"));
        }

        Ok(ProjectionTranslator { columns })
    }

    /// Expression referencing a projected column.
    pub fn column(&self, idx: usize) -> Result<Expr> {
        let (name, _) = self.columns.get(idx).ok_or_else(|| {
            DbError::new(format!("Missing projected column at index {idx}"))
                .with_field("num_columns", self.columns.len())
        })?;
        Ok(Expr::ident(name))
    }
}

impl Explainable for ProjectionTranslator {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new("Projection");
        if conf.verbose {
            ent.with_values(
                "projections",
                self.columns
                    .iter()
                    .map(|(name, expr)| format!("{name} = {expr}")),
            )
        } else {
            ent.with_values("projections", self.columns.iter().map(|(_, expr)| expr))
        }
    }
}

impl OperatorTranslator for ProjectionTranslator {
    fn is_vectorizable(&self) -> bool {
        true
    }

    fn is_parallelizable(&self) -> bool {
        true
    }

    fn produce(&self, _codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        for (name, expr) in &self.columns {
            builder.append(Stmt::declare(name, None, Some(expr.clone())));
        }
        Ok(())
    }
}
