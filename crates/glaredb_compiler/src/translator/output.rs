use glaredb_error::{DbError, Result};
use hashbrown::HashSet;

use crate::ast::{Decl, Expr, FieldDecl, Identifier, Stmt, StructDecl, Type};
use crate::codegen::CodeGen;
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::translator::OperatorTranslator;

/// A single column written to the query result.
#[derive(Debug, Clone)]
pub struct OutputColumn {
    pub name: String,
    pub ty: Type,
    pub expr: Expr,
}

/// Writes rows to the result buffer for the client. Always the sink of the
/// final pipeline in a query.
#[derive(Debug)]
pub struct OutputTranslator {
    /// Struct describing a single output row.
    row_type: Identifier,
    /// Variable pointing to the row currently being written.
    row: Identifier,
    /// State field holding the result buffer.
    buffer: Identifier,
    buffer_type: Identifier,
    columns: Vec<(Identifier, OutputColumn)>,
}

impl OutputTranslator {
    pub fn new(codegen: &CodeGen, columns: Vec<OutputColumn>) -> Result<Self> {
        if columns.is_empty() {
            return Err(DbError::new("Output requires at least one column"));
        }

        // Field names only need to be unique within the row struct, so column
        // names are used as is.
        let mut seen = HashSet::with_capacity(columns.len());
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(DbError::new("Duplicate output column name")
                    .with_field("name", &col.name));
            }
        }
        drop(seen);

        let columns = columns
            .into_iter()
            .map(|col| (codegen.identifier(&col.name), col))
            .collect();

        Ok(OutputTranslator {
            row_type: codegen.new_identifier("OutputRow"),
            row: codegen.new_identifier("out"),
            buffer: codegen.new_identifier("output_buffer"),
            buffer_type: codegen.identifier("OutputBuffer"),
            columns,
        })
    }
}

impl Explainable for OutputTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("Output").with_values(
            "columns",
            self.columns.iter().map(|(_, col)| col.name.as_str()),
        )
    }
}

impl OperatorTranslator for OutputTranslator {
    fn is_vectorizable(&self) -> bool {
        true
    }

    fn is_parallelizable(&self) -> bool {
        // Single result buffer, rows must be appended in order.
        false
    }

    fn initialize_declarations(&self, _codegen: &CodeGen, decls: &mut Vec<Decl>) -> Result<()> {
        let fields = self
            .columns
            .iter()
            .map(|(field, col)| FieldDecl::new(field, col.ty.clone()))
            .collect();

        decls.push(Decl::Struct(StructDecl {
            name: self.row_type.clone(),
            fields,
        }));

        Ok(())
    }

    fn initialize_state_fields(
        &self,
        _codegen: &CodeGen,
        fields: &mut Vec<FieldDecl>,
    ) -> Result<()> {
        fields.push(FieldDecl::new(
            &self.buffer,
            Type::pointer_to(Type::named(&self.buffer_type)),
        ));
        Ok(())
    }

    fn initialize_setup(&self, codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.push(Stmt::assign(
            codegen.state_field(&self.buffer),
            Expr::builtin(
                "resultBufferNew",
                [Expr::builtin("sizeOf", [Expr::ident(&self.row_type)])],
            ),
        ));
        Ok(())
    }

    fn initialize_teardown(&self, codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.push(Stmt::Expr(Expr::builtin(
            "resultBufferFinalize",
            [codegen.state_field(&self.buffer)],
        )));
        Ok(())
    }

    fn produce(&self, codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        builder.append(Stmt::declare(
            &self.row,
            Some(Type::pointer_to(Type::named(&self.row_type))),
            Some(Expr::builtin(
                "resultBufferAllocRow",
                [codegen.state_field(&self.buffer)],
            )),
        ));

        for (field, col) in &self.columns {
            builder.append(Stmt::assign(
                Expr::ident(&self.row).field(field),
                col.expr.clone(),
            ));
        }

        Ok(())
    }
}
