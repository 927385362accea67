use std::fmt;
use std::sync::Arc;

use glaredb_error::{DbError, Result};

use crate::ast::{
    BinaryOperator,
    Block,
    Decl,
    Expr,
    FieldDecl,
    FunctionDecl,
    Identifier,
    Stmt,
    StructDecl,
    Type,
};
use crate::codegen::CodeGen;
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::translator::OperatorTranslator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
}

impl AggregateFunction {
    /// Runtime type holding the aggregate state.
    fn state_type_name(&self) -> &'static str {
        match self {
            Self::Count => "CountAggregate",
            Self::Sum => "IntegerSumAggregate",
            Self::Min => "IntegerMinAggregate",
            Self::Max => "IntegerMaxAggregate",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Sum => write!(f, "sum"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    pub input: Expr,
}

/// Identifiers shared between the build and scan halves of a hash aggregate.
#[derive(Debug)]
struct AggregateLayout {
    /// Struct for a single entry in the hash table.
    payload_type: Identifier,
    /// State field holding the hash table.
    hash_table: Identifier,
    hash_table_type: Identifier,
    /// Function comparing the group values of two payloads.
    key_check_fn: Identifier,
    /// Payload fields for group values. Group values are stored as int64.
    group_fields: Vec<Identifier>,
    /// Payload fields for aggregate states, along with their types.
    agg_fields: Vec<(Identifier, Identifier)>,
}

/// Inserts rows into an aggregate hash table.
///
/// This is the sink of its pipeline. The hash table is read by a
/// `AggregateScanTranslator` in a later pipeline.
#[derive(Debug)]
pub struct AggregateBuildTranslator {
    layout: Arc<AggregateLayout>,
    groups: Vec<Expr>,
    aggregates: Vec<AggregateExpr>,
    /// Payload holding the group values of the current row, used for the
    /// key check on lookup.
    values: Identifier,
    /// Hash of the group values for the current row.
    hash_val: Identifier,
    /// Pointer to the hash table entry for the current row.
    payload: Identifier,
}

impl AggregateBuildTranslator {
    pub fn new(
        codegen: &CodeGen,
        groups: Vec<Expr>,
        aggregates: Vec<AggregateExpr>,
    ) -> Result<Self> {
        if groups.is_empty() && aggregates.is_empty() {
            return Err(DbError::new(
                "Hash aggregate requires at least one group or aggregate",
            ));
        }

        let group_fields = (0..groups.len())
            .map(|idx| codegen.new_identifier(&format!("group{idx}")))
            .collect();
        let agg_fields = aggregates
            .iter()
            .enumerate()
            .map(|(idx, agg)| {
                (
                    codegen.new_identifier(&format!("agg{idx}")),
                    codegen.identifier(agg.function.state_type_name()),
                )
            })
            .collect();

        let layout = AggregateLayout {
            payload_type: codegen.new_identifier("AggPayload"),
            hash_table: codegen.new_identifier("agg_ht"),
            hash_table_type: codegen.identifier("AggregationHashTable"),
            key_check_fn: codegen.new_identifier("aggKeyCheck"),
            group_fields,
            agg_fields,
        };

        Ok(AggregateBuildTranslator {
            layout: Arc::new(layout),
            groups,
            aggregates,
            values: codegen.new_identifier("agg_values"),
            hash_val: codegen.new_identifier("agg_hash"),
            payload: codegen.new_identifier("agg_payload"),
        })
    }

    /// Create the translator reading from the hash table this translator
    /// builds.
    pub fn scan_translator(&self, codegen: &CodeGen) -> AggregateScanTranslator {
        AggregateScanTranslator {
            layout: self.layout.clone(),
            iter: codegen.new_identifier("agg_iter"),
            iter_type: codegen.identifier("AggregationHashTableIterator"),
            row: codegen.new_identifier("agg_row"),
        }
    }

    /// Function passed to hash table lookups to tell apart groups with equal
    /// hashes.
    ///
    /// Returns true if all group values are equal. Always true when there are
    /// no groups.
    fn key_check_function(&self, codegen: &CodeGen) -> FunctionDecl {
        let lhs = codegen.identifier("lhs");
        let rhs = codegen.identifier("rhs");
        let payload_ptr = Type::pointer_to(Type::named(&self.layout.payload_type));

        let matches = self
            .layout
            .group_fields
            .iter()
            .map(|field| {
                Expr::binary(
                    BinaryOperator::Eq,
                    Expr::ident(&lhs).field(field),
                    Expr::ident(&rhs).field(field),
                )
            })
            .reduce(|acc, eq| Expr::binary(BinaryOperator::And, acc, eq))
            .unwrap_or(Expr::Bool(true));

        FunctionDecl {
            name: self.layout.key_check_fn.clone(),
            params: vec![
                FieldDecl::new(&lhs, payload_ptr.clone()),
                FieldDecl::new(&rhs, payload_ptr),
            ],
            ret: Type::Bool,
            body: Block::new(vec![Stmt::Return(Some(matches))]),
        }
    }
}

impl Explainable for AggregateBuildTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("AggregateBuild")
            .with_values("groups", &self.groups)
            .with_values(
                "aggregates",
                self.aggregates
                    .iter()
                    .map(|agg| format!("{}({})", agg.function, agg.input)),
            )
    }
}

impl OperatorTranslator for AggregateBuildTranslator {
    fn is_vectorizable(&self) -> bool {
        // Per-row lookup and insert.
        false
    }

    fn is_parallelizable(&self) -> bool {
        // Single shared hash table.
        false
    }

    fn initialize_declarations(&self, codegen: &CodeGen, decls: &mut Vec<Decl>) -> Result<()> {
        let mut fields: Vec<_> = self
            .layout
            .group_fields
            .iter()
            .map(|field| FieldDecl::new(field, Type::Int64))
            .collect();
        fields.extend(
            self.layout
                .agg_fields
                .iter()
                .map(|(field, ty)| FieldDecl::new(field, Type::named(ty))),
        );

        decls.push(Decl::Struct(StructDecl {
            name: self.layout.payload_type.clone(),
            fields,
        }));
        decls.push(Decl::Function(self.key_check_function(codegen)));

        Ok(())
    }

    fn initialize_state_fields(
        &self,
        _codegen: &CodeGen,
        fields: &mut Vec<FieldDecl>,
    ) -> Result<()> {
        fields.push(FieldDecl::new(
            &self.layout.hash_table,
            Type::named(&self.layout.hash_table_type),
        ));
        Ok(())
    }

    fn initialize_setup(&self, codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.push(Stmt::Expr(Expr::builtin(
            "aggHTInit",
            [
                codegen.state_field_ptr(&self.layout.hash_table),
                Expr::builtin("sizeOf", [Expr::ident(&self.layout.payload_type)]),
            ],
        )));
        Ok(())
    }

    fn initialize_teardown(&self, codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.push(Stmt::Expr(Expr::builtin(
            "aggHTFree",
            [codegen.state_field_ptr(&self.layout.hash_table)],
        )));
        Ok(())
    }

    fn produce(&self, codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        let ht = codegen.state_field_ptr(&self.layout.hash_table);
        let payload = Expr::ident(&self.payload);
        let values = Expr::ident(&self.values);

        // Group values are evaluated once into a payload used for both hashing
        // and the key check.
        builder.append(Stmt::declare(
            &self.values,
            Some(Type::named(&self.layout.payload_type)),
            None,
        ));
        for (field, group) in self.layout.group_fields.iter().zip(&self.groups) {
            builder.append(Stmt::assign(values.clone().field(field), group.clone()));
        }
        builder.append(Stmt::declare(
            &self.hash_val,
            None,
            Some(Expr::builtin(
                "hash",
                self.layout
                    .group_fields
                    .iter()
                    .map(|field| values.clone().field(field)),
            )),
        ));
        builder.append(Stmt::declare(
            &self.payload,
            Some(Type::pointer_to(Type::named(&self.layout.payload_type))),
            Some(Expr::builtin(
                "aggHTLookup",
                [
                    ht.clone(),
                    Expr::ident(&self.hash_val),
                    Expr::ident(&self.layout.key_check_fn),
                    values.clone().address_of(),
                ],
            )),
        ));

        // Insert and initialize a new entry if no entry with equal group
        // values exists.
        builder.start_if(Expr::binary(
            BinaryOperator::Eq,
            payload.clone(),
            Expr::Nil,
        ));
        builder.append(Stmt::assign(
            payload.clone(),
            Expr::builtin("aggHTInsert", [ht, Expr::ident(&self.hash_val)]),
        ));
        for field in &self.layout.group_fields {
            builder.append(Stmt::assign(
                payload.clone().field(field),
                values.clone().field(field),
            ));
        }
        for (field, _) in &self.layout.agg_fields {
            builder.append(Stmt::Expr(Expr::builtin(
                "aggInit",
                [payload.clone().field(field).address_of()],
            )));
        }
        builder.finish_block()?;

        for ((field, _), agg) in self.layout.agg_fields.iter().zip(&self.aggregates) {
            builder.append(Stmt::Expr(Expr::builtin(
                "aggAdvance",
                [payload.clone().field(field).address_of(), agg.input.clone()],
            )));
        }

        Ok(())
    }
}

/// Iterates over the entries of an aggregate hash table built by a previous
/// pipeline. Always the source of its pipeline.
#[derive(Debug)]
pub struct AggregateScanTranslator {
    layout: Arc<AggregateLayout>,
    iter: Identifier,
    iter_type: Identifier,
    /// Pointer to the current hash table entry.
    row: Identifier,
}

impl AggregateScanTranslator {
    /// Expression reading a group value of the current entry.
    pub fn group(&self, idx: usize) -> Result<Expr> {
        let field = self.layout.group_fields.get(idx).ok_or_else(|| {
            DbError::new(format!("Missing group at index {idx}"))
                .with_field("num_groups", self.layout.group_fields.len())
        })?;
        Ok(Expr::ident(&self.row).field(field))
    }

    /// Expression reading the final value of an aggregate of the current
    /// entry.
    pub fn aggregate(&self, idx: usize) -> Result<Expr> {
        let (field, _) = self.layout.agg_fields.get(idx).ok_or_else(|| {
            DbError::new(format!("Missing aggregate at index {idx}"))
                .with_field("num_aggregates", self.layout.agg_fields.len())
        })?;
        Ok(Expr::builtin(
            "aggResult",
            [Expr::ident(&self.row).field(field).address_of()],
        ))
    }
}

impl Explainable for AggregateScanTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("AggregateScan").with_value("hash_table", &self.layout.hash_table)
    }
}

impl OperatorTranslator for AggregateScanTranslator {
    fn is_vectorizable(&self) -> bool {
        false
    }

    fn is_parallelizable(&self) -> bool {
        false
    }

    fn produce(&self, codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        let iter = Expr::ident(&self.iter).address_of();

        builder.append(Stmt::declare(
            &self.iter,
            Some(Type::named(&self.iter_type)),
            None,
        ));
        builder.start_for(
            Some(Stmt::Expr(Expr::builtin(
                "aggHTIterInit",
                [
                    iter.clone(),
                    codegen.state_field_ptr(&self.layout.hash_table),
                ],
            ))),
            Some(Expr::builtin("aggHTIterHasNext", [iter.clone()])),
            Some(Stmt::Expr(Expr::builtin("aggHTIterNext", [iter.clone()]))),
        );
        builder.defer(Stmt::Expr(Expr::builtin("aggHTIterClose", [iter.clone()])));
        builder.append(Stmt::declare(
            &self.row,
            Some(Type::pointer_to(Type::named(&self.layout.payload_type))),
            Some(Expr::builtin("aggHTIterGetRow", [iter])),
        ));

        Ok(())
    }
}
