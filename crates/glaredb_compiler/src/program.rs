use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{Decl, Identifier};
use crate::config::CompilerConfig;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::pipeline::PipelineIndex;

/// How the runtime is allowed to execute a compiled pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMode {
    /// Pipeline function may be handed batches of rows.
    pub vectorized: bool,
    /// Pipeline function may be invoked concurrently on disjoint partitions.
    pub parallel: bool,
    /// Rows per batch. Always 1 when not vectorized.
    pub batch_size: usize,
}

impl ExecutionMode {
    pub fn new(config: &CompilerConfig, is_vectorizable: bool, is_parallelizable: bool) -> Self {
        let vectorized = is_vectorizable && config.enable_vectorization;
        ExecutionMode {
            vectorized,
            parallel: is_parallelizable && config.enable_parallelism,
            batch_size: if vectorized { config.batch_size } else { 1 },
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exec = if self.parallel { "parallel" } else { "serial" };
        if self.vectorized {
            write!(f, "{exec}, vectorized (batch_size = {})", self.batch_size)
        } else {
            write!(f, "{exec}, row-at-a-time")
        }
    }
}

/// Information about a single compiled pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineInfo {
    pub index: PipelineIndex,
    /// Name of the generated pipeline function.
    pub name: Identifier,
    pub is_vectorizable: bool,
    pub is_parallelizable: bool,
    pub mode: ExecutionMode,
}

impl Explainable for PipelineInfo {
    fn explain_entry(&self, conf: ExplainConfig) -> ExplainEntry {
        let ent = ExplainEntry::new(format!("Pipeline {}", self.index))
            .with_value("function", &self.name)
            .with_value("mode", self.mode);

        if conf.verbose {
            ent.with_value("vectorizable", self.is_vectorizable)
                .with_value("parallelizable", self.is_parallelizable)
        } else {
            ent
        }
    }
}

/// Output of compiling a plan fragment.
#[derive(Debug)]
pub struct Program {
    /// All top-level declarations, in the order they should be emitted.
    pub decls: Vec<Decl>,
    /// Compiled pipelines in execution order.
    pub pipelines: Vec<PipelineInfo>,
    /// Function running the query start to finish.
    pub entry: Identifier,
}

impl Program {
    pub fn get_decl(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|decl| decl.name().as_str() == name)
    }

    pub fn get_pipeline(&self, index: PipelineIndex) -> Option<&PipelineInfo> {
        self.pipelines.iter().find(|p| p.index == index)
    }

    pub fn explain(&self, conf: ExplainConfig) -> Vec<ExplainEntry> {
        self.pipelines
            .iter()
            .map(|p| p.explain_entry(conf))
            .collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, decl) in self.decls.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{decl}")?;
        }
        Ok(())
    }
}
