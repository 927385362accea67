//! Compiles physical operators into fused pipeline functions.
//!
//! A query plan is split into pipelines at materialization boundaries (hash
//! aggregate builds, sorts). Each pipeline holds the translators for the
//! operators fused into it and generates a single function running all of
//! them. A `PlanFragment` compiles all pipelines of a query into a `Program`.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod explain;
pub mod fragment;
pub mod pipeline;
pub mod program;
pub mod translator;

#[cfg(test)]
pub(crate) mod testutil;
