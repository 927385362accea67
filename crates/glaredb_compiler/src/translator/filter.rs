use glaredb_error::Result;

use crate::ast::Expr;
use crate::codegen::CodeGen;
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::translator::OperatorTranslator;

/// Only passes rows satisfying the predicate to downstream operators.
#[derive(Debug)]
pub struct FilterTranslator {
    predicate: Expr,
}

impl FilterTranslator {
    pub fn new(predicate: Expr) -> Self {
        FilterTranslator { predicate }
    }
}

impl Explainable for FilterTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Filter").with_value("predicate", &self.predicate)
    }
}

impl OperatorTranslator for FilterTranslator {
    fn is_vectorizable(&self) -> bool {
        true
    }

    fn is_parallelizable(&self) -> bool {
        true
    }

    fn produce(&self, _codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        builder.start_if(self.predicate.clone());
        Ok(())
    }
}
