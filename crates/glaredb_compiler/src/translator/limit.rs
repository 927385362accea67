use glaredb_error::{DbError, Result};

use crate::ast::{BinaryOperator, Expr, FieldDecl, Identifier, Stmt, Type};
use crate::codegen::CodeGen;
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::translator::OperatorTranslator;

/// Passes through at most `limit` rows.
///
/// The count of rows seen is kept on the query state and checked for every
/// row.
#[derive(Debug)]
pub struct LimitTranslator {
    /// Compared against the int64 counter in generated code.
    limit: i64,
    counter: Identifier,
}

impl LimitTranslator {
    pub fn new(codegen: &CodeGen, limit: u64) -> Result<Self> {
        let limit = i64::try_from(limit).map_err(|_| {
            DbError::new("Limit does not fit in a 64-bit signed integer")
                .with_field("limit", limit)
        })?;

        Ok(LimitTranslator {
            limit,
            counter: codegen.new_identifier("limit_count"),
        })
    }
}

impl Explainable for LimitTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Limit").with_value("limit", self.limit)
    }
}

impl OperatorTranslator for LimitTranslator {
    fn is_vectorizable(&self) -> bool {
        // Needs to stop at an exact row.
        false
    }

    fn is_parallelizable(&self) -> bool {
        // Shared counter.
        false
    }

    fn initialize_state_fields(
        &self,
        _codegen: &CodeGen,
        fields: &mut Vec<FieldDecl>,
    ) -> Result<()> {
        fields.push(FieldDecl::new(&self.counter, Type::Int64));
        Ok(())
    }

    fn initialize_setup(&self, codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.push(Stmt::assign(codegen.state_field(&self.counter), Expr::Int(0)));
        Ok(())
    }

    fn produce(&self, codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        let counter = codegen.state_field(&self.counter);

        builder.start_if(Expr::binary(
            BinaryOperator::Lt,
            counter.clone(),
            Expr::Int(self.limit),
        ));
        builder.append(Stmt::assign(
            counter.clone(),
            Expr::binary(BinaryOperator::Add, counter, Expr::Int(1)),
        ));

        Ok(())
    }
}
