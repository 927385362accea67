use std::fmt;

use glaredb_error::{DbError, OptionExt, Result};
use tracing::trace;

use crate::ast::{Decl, FieldDecl, Identifier, Stmt, Type};
use crate::codegen::{CodeGen, PIPELINE_PREFIX};
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::translator::OperatorTranslator;

/// Position of a pipeline within its plan fragment.
///
/// Unique within a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipelineIndex(pub u32);

impl fmt::Display for PipelineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Operators may still be added.
    Building,
    /// Declarations, state, setup and teardown have been collected at least
    /// once. The operator sequence is fixed.
    Initialized,
    /// The pipeline function has been generated. Nothing else may be done
    /// with the pipeline other than requesting its name.
    Produced,
}

/// A sequence of operators fused into a single generated function.
///
/// Operators are added in the order a top-down walk of the operator tree
/// visits them, so the sink of the pipeline is added first and the source
/// last. Code is emitted in the reverse order: the source opens a loop over
/// its input, and each operator downstream of it emits inside that loop.
#[derive(Debug)]
pub struct Pipeline<'a> {
    codegen: &'a CodeGen,
    operators: Vec<Box<dyn OperatorTranslator>>,
    /// Assigned when the pipeline is produced.
    index: Option<PipelineIndex>,
    state: PipelineState,
    /// If every operator in the pipeline can execute on batches.
    is_vectorizable: bool,
    /// If every operator in the pipeline can execute in parallel.
    is_parallelizable: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(codegen: &'a CodeGen) -> Self {
        Pipeline {
            codegen,
            operators: Vec::new(),
            index: None,
            state: PipelineState::Building,
            is_vectorizable: true,
            is_parallelizable: true,
        }
    }

    /// Add an operator to the pipeline.
    ///
    /// Any operator is accepted, an operator that can't be vectorized or
    /// parallelized disables that execution mode for the entire pipeline.
    ///
    /// Errors once the pipeline has been initialized since the added operator
    /// would never contribute its state.
    pub fn add(&mut self, translator: Box<dyn OperatorTranslator>) -> Result<()> {
        match self.state {
            PipelineState::Building => (),
            PipelineState::Initialized => {
                return Err(DbError::new(
                    "Cannot add operator to a pipeline that has already been initialized",
                )
                .with_field("num_operators", self.operators.len()));
            }
            PipelineState::Produced => {
                return Err(self.already_produced_error("add operator to"));
            }
        }

        self.is_vectorizable = self.is_vectorizable && translator.is_vectorizable();
        self.is_parallelizable = self.is_parallelizable && translator.is_parallelizable();
        self.operators.push(translator);

        Ok(())
    }

    pub(crate) fn codegen(&self) -> &'a CodeGen {
        self.codegen
    }

    pub fn is_vectorizable(&self) -> bool {
        self.is_vectorizable
    }

    pub fn is_parallelizable(&self) -> bool {
        self.is_parallelizable
    }

    pub fn num_operators(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Index of this pipeline, None if it hasn't been produced yet.
    pub fn index(&self) -> Option<PipelineIndex> {
        self.index
    }

    /// Get the name of the generated pipeline function.
    ///
    /// The name depends on the index assigned in `produce`, so this errors if
    /// the pipeline hasn't been produced yet.
    pub fn pipeline_name(&self) -> Result<Identifier> {
        let index = self
            .index
            .required("Pipeline index not assigned, pipeline must be produced before it's named")?;
        Ok(self.codegen.identifier(&format!("{PIPELINE_PREFIX}{index}")))
    }

    /// Collect the top-level declarations, query state fields, and setup and
    /// teardown statements for all operators in this pipeline.
    ///
    /// Contributions are appended in the order operators were added. Nothing
    /// is appended if any operator fails to contribute.
    pub fn initialize(
        &mut self,
        decls: &mut Vec<Decl>,
        state_fields: &mut Vec<FieldDecl>,
        setup_stmts: &mut Vec<Stmt>,
        teardown_stmts: &mut Vec<Stmt>,
    ) -> Result<()> {
        if self.state == PipelineState::Produced {
            return Err(self.already_produced_error("initialize"));
        }

        let mut new_decls = Vec::new();
        let mut new_fields = Vec::new();
        let mut new_setup = Vec::new();
        let mut new_teardown = Vec::new();

        for operator in &self.operators {
            operator.initialize_declarations(self.codegen, &mut new_decls)?;
            operator.initialize_state_fields(self.codegen, &mut new_fields)?;
            operator.initialize_setup(self.codegen, &mut new_setup)?;
            operator.initialize_teardown(self.codegen, &mut new_teardown)?;
        }

        decls.append(&mut new_decls);
        state_fields.append(&mut new_fields);
        setup_stmts.append(&mut new_setup);
        teardown_stmts.append(&mut new_teardown);

        self.state = PipelineState::Initialized;

        Ok(())
    }

    /// Generate the function for this pipeline.
    ///
    /// Assigns the pipeline's index. May only be called once.
    pub fn produce(&mut self, index: PipelineIndex) -> Result<Decl> {
        if self.state == PipelineState::Produced {
            return Err(self.already_produced_error("produce"));
        }

        self.index = Some(index);
        self.state = PipelineState::Produced;

        let name = self.pipeline_name()?;
        trace!(
            %name,
            num_operators = self.operators.len(),
            vectorizable = self.is_vectorizable,
            parallelizable = self.is_parallelizable,
            "producing pipeline"
        );

        let mut builder = FunctionBuilder::new(name, self.codegen.pipeline_params(), Type::Nil);
        for operator in self.operators.iter().rev() {
            operator.produce(self.codegen, &mut builder)?;
        }

        let func = builder.finish()?;

        Ok(Decl::Function(func))
    }

    fn already_produced_error(&self, action: &str) -> DbError {
        let mut err = DbError::new(format!(
            "Cannot {action} a pipeline that has already been produced"
        ));
        if let Some(index) = self.index {
            err = err.with_field("index", index);
        }
        err
    }
}

impl Explainable for Pipeline<'_> {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let name = match self.index {
            Some(index) => format!("Pipeline {index}"),
            None => "Pipeline".to_string(),
        };

        ExplainEntry::new(name)
            .with_value("vectorizable", self.is_vectorizable)
            .with_value("parallelizable", self.is_parallelizable)
            .with_values(
                "operators",
                self.operators.iter().map(|op| op.explain_entry(conf)),
            )
    }
}
