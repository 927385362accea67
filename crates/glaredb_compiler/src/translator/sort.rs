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
pub struct SortKey {
    /// Index of the sorted column.
    pub column: usize,
    pub desc: bool,
}

/// Identifiers shared between the build and scan halves of a sort.
#[derive(Debug)]
struct SortLayout {
    /// Struct for a single row in the sorter. All columns are int64.
    row_type: Identifier,
    /// State field holding the sorter.
    sorter: Identifier,
    sorter_type: Identifier,
    compare_fn: Identifier,
    columns: Vec<Identifier>,
}

/// Materializes rows into a sorter. The sink of its pipeline.
#[derive(Debug)]
pub struct SortBuildTranslator {
    layout: Arc<SortLayout>,
    inputs: Vec<Expr>,
    keys: Vec<SortKey>,
    /// Pointer to the row currently being inserted.
    row: Identifier,
}

impl SortBuildTranslator {
    pub fn new(codegen: &CodeGen, inputs: Vec<Expr>, keys: Vec<SortKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(DbError::new("Sort requires at least one key"));
        }
        if let Some(key) = keys.iter().find(|key| key.column >= inputs.len()) {
            return Err(DbError::new("Sort key references missing column")
                .with_field("column", key.column)
                .with_field("num_columns", inputs.len()));
        }

        let columns = (0..inputs.len())
            .map(|idx| codegen.new_identifier(&format!("col{idx}")))
            .collect();

        let layout = SortLayout {
            row_type: codegen.new_identifier("SortRow"),
            sorter: codegen.new_identifier("sorter"),
            sorter_type: codegen.identifier("Sorter"),
            compare_fn: codegen.new_identifier("sortCompare"),
            columns,
        };

        Ok(SortBuildTranslator {
            layout: Arc::new(layout),
            inputs,
            keys,
            row: codegen.new_identifier("sort_row"),
        })
    }

    /// Create the translator reading the sorted rows.
    pub fn scan_translator(&self, codegen: &CodeGen) -> SortScanTranslator {
        SortScanTranslator {
            layout: self.layout.clone(),
            iter: codegen.new_identifier("sort_iter"),
            iter_type: codegen.identifier("SorterIterator"),
            row: codegen.new_identifier("sort_out"),
        }
    }

    /// Comparison function used by the sorter.
    ///
    /// Returns negative if lhs sorts before rhs, positive if after, zero if
    /// equal on all keys.
    fn compare_function(&self, codegen: &CodeGen) -> FunctionDecl {
        let lhs = codegen.identifier("lhs");
        let rhs = codegen.identifier("rhs");
        let row_ptr = Type::pointer_to(Type::named(&self.layout.row_type));

        let mut stmts = Vec::with_capacity(self.keys.len() * 2 + 1);
        for key in &self.keys {
            let col = &self.layout.columns[key.column];
            let (before, after) = if key.desc { (1, -1) } else { (-1, 1) };

            for (op, ret) in [(BinaryOperator::Lt, before), (BinaryOperator::Gt, after)] {
                stmts.push(Stmt::If {
                    condition: Expr::binary(
                        op,
                        Expr::ident(&lhs).field(col),
                        Expr::ident(&rhs).field(col),
                    ),
                    then: Block::new(vec![Stmt::Return(Some(Expr::Int(ret)))]),
                    otherwise: None,
                });
            }
        }
        stmts.push(Stmt::Return(Some(Expr::Int(0))));

        FunctionDecl {
            name: self.layout.compare_fn.clone(),
            params: vec![
                FieldDecl::new(&lhs, row_ptr.clone()),
                FieldDecl::new(&rhs, row_ptr),
            ],
            ret: Type::Int32,
            body: Block::new(stmts),
        }
    }
}

impl Explainable for SortBuildTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("SortBuild").with_values(
            "keys",
            self.keys.iter().map(|key| {
                let dir = if key.desc { "DESC" } else { "ASC" };
                format!("#{} {dir}", key.column)
            }),
        )
    }
}

impl OperatorTranslator for SortBuildTranslator {
    fn is_vectorizable(&self) -> bool {
        true
    }

    fn is_parallelizable(&self) -> bool {
        // Single sorter, no thread-local runs.
        false
    }

    fn initialize_declarations(&self, codegen: &CodeGen, decls: &mut Vec<Decl>) -> Result<()> {
        decls.push(Decl::Struct(StructDecl {
            name: self.layout.row_type.clone(),
            fields: self
                .layout
                .columns
                .iter()
                .map(|col| FieldDecl::new(col, Type::Int64))
                .collect(),
        }));
        decls.push(Decl::Function(self.compare_function(codegen)));
        Ok(())
    }

    fn initialize_state_fields(
        &self,
        _codegen: &CodeGen,
        fields: &mut Vec<FieldDecl>,
    ) -> Result<()> {
        fields.push(FieldDecl::new(
            &self.layout.sorter,
            Type::named(&self.layout.sorter_type),
        ));
        Ok(())
    }

    fn initialize_setup(&self, codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.push(Stmt::Expr(Expr::builtin(
            "sorterInit",
            [
                codegen.state_field_ptr(&self.layout.sorter),
                Expr::ident(&self.layout.compare_fn),
                Expr::builtin("sizeOf", [Expr::ident(&self.layout.row_type)]),
            ],
        )));
        Ok(())
    }

    fn initialize_teardown(&self, codegen: &CodeGen, stmts: &mut Vec<Stmt>) -> Result<()> {
        stmts.push(Stmt::Expr(Expr::builtin(
            "sorterFree",
            [codegen.state_field_ptr(&self.layout.sorter)],
        )));
        Ok(())
    }

    fn produce(&self, codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        builder.append(Stmt::declare(
            &self.row,
            Some(Type::pointer_to(Type::named(&self.layout.row_type))),
            Some(Expr::builtin(
                "sorterInsert",
                [codegen.state_field_ptr(&self.layout.sorter)],
            )),
        ));

        for (col, input) in self.layout.columns.iter().zip(&self.inputs) {
            builder.append(Stmt::assign(
                Expr::ident(&self.row).field(col),
                input.clone(),
            ));
        }

        Ok(())
    }
}

/// Sorts the rows materialized by a `SortBuildTranslator` and iterates over
/// them in order. The source of its pipeline.
#[derive(Debug)]
pub struct SortScanTranslator {
    layout: Arc<SortLayout>,
    iter: Identifier,
    iter_type: Identifier,
    /// Pointer to the current sorted row.
    row: Identifier,
}

impl SortScanTranslator {
    /// Expression reading a column of the current sorted row.
    pub fn column(&self, idx: usize) -> Result<Expr> {
        let col = self.layout.columns.get(idx).ok_or_else(|| {
            DbError::new(format!("Missing sort column at index {idx}"))
                .with_field("num_columns", self.layout.columns.len())
        })?;
        Ok(Expr::ident(&self.row).field(col))
    }
}

impl Explainable for SortScanTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("SortScan").with_value("sorter", &self.layout.sorter)
    }
}

impl OperatorTranslator for SortScanTranslator {
    fn is_vectorizable(&self) -> bool {
        false
    }

    fn is_parallelizable(&self) -> bool {
        // Output order must be preserved.
        false
    }

    fn produce(&self, codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        let sorter = codegen.state_field_ptr(&self.layout.sorter);
        let iter = Expr::ident(&self.iter).address_of();

        builder.append(Stmt::Expr(Expr::builtin("sorterSort", [sorter.clone()])));
        builder.append(Stmt::declare(
            &self.iter,
            Some(Type::named(&self.iter_type)),
            None,
        ));
        builder.start_for(
            Some(Stmt::Expr(Expr::builtin(
                "sorterIterInit",
                [iter.clone(), sorter],
            ))),
            Some(Expr::builtin("sorterIterHasNext", [iter.clone()])),
            Some(Stmt::Expr(Expr::builtin("sorterIterNext", [iter.clone()]))),
        );
        builder.defer(Stmt::Expr(Expr::builtin("sorterIterClose", [iter.clone()])));
        builder.append(Stmt::declare(
            &self.row,
            Some(Type::pointer_to(Type::named(&self.layout.row_type))),
            Some(Expr::builtin("sorterIterGetRow", [iter])),
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::produce_to_string;

    fn test_build(codegen: &CodeGen) -> SortBuildTranslator {
        let a = codegen.identifier("a");
        let b = codegen.identifier("b");
        SortBuildTranslator::new(
            codegen,
            vec![Expr::ident(&a), Expr::ident(&b)],
            vec![
                SortKey {
                    column: 1,
                    desc: true,
                },
                SortKey {
                    column: 0,
                    desc: false,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn build_declarations() {
        let codegen = CodeGen::default();
        let build = test_build(&codegen);

        let mut decls = Vec::new();
        build.initialize_declarations(&codegen, &mut decls).unwrap();
        assert_eq!(2, decls.len());
        assert_eq!(
            "struct SortRow {\n    col0: int64\n    col1: int64\n}",
            decls[0].to_string()
        );

        let expected = "\
fun sortCompare(lhs: *SortRow, rhs: *SortRow) -> int32 {
    if (lhs.col1 < rhs.col1) {
        return 1
    }
    if (lhs.col1 > rhs.col1) {
        return -1
    }
    if (lhs.col0 < rhs.col0) {
        return -1
    }
    if (lhs.col0 > rhs.col0) {
        return 1
    }
    return 0
}";
        assert_eq!(expected, decls[1].to_string());
    }

    #[test]
    fn build_setup_teardown() {
        let codegen = CodeGen::default();
        let build = test_build(&codegen);

        let mut setup = Vec::new();
        let mut teardown = Vec::new();
        build.initialize_setup(&codegen, &mut setup).unwrap();
        build.initialize_teardown(&codegen, &mut teardown).unwrap();

        assert_eq!(
            "@sorterInit(&state.sorter, sortCompare, @sizeOf(SortRow))",
            setup[0].to_string()
        );
        assert_eq!("@sorterFree(&state.sorter)", teardown[0].to_string());
    }

    #[test]
    fn build_produce() {
        let codegen = CodeGen::default();
        let build = test_build(&codegen);

        let out = produce_to_string(&codegen, &build);
        let expected = "\
fun test(state: *State) -> nil {
    var sort_row: *SortRow = @sorterInsert(&state.sorter)
    sort_row.col0 = a
    sort_row.col1 = b
}";
        assert_eq!(expected, out);
        assert!(build.is_vectorizable());
        assert!(!build.is_parallelizable());
    }

    #[test]
    fn scan_produce() {
        let codegen = CodeGen::default();
        let scan = test_build(&codegen).scan_translator(&codegen);

        assert_eq!("sort_out.col1", scan.column(1).unwrap().to_string());
        scan.column(2).unwrap_err();

        let out = produce_to_string(&codegen, &scan);
        let expected = "\
fun test(state: *State) -> nil {
    @sorterSort(&state.sorter)
    var sort_iter: SorterIterator
    for (@sorterIterInit(&sort_iter, &state.sorter); @sorterIterHasNext(&sort_iter); @sorterIterNext(&sort_iter)) {
        var sort_out: *SortRow = @sorterIterGetRow(&sort_iter)
    }
    @sorterIterClose(&sort_iter)
}";
        assert_eq!(expected, out);
    }

    #[test]
    fn invalid_keys() {
        let codegen = CodeGen::default();
        SortBuildTranslator::new(&codegen, vec![Expr::Int(1)], Vec::new()).unwrap_err();

        let err = SortBuildTranslator::new(
            &codegen,
            vec![Expr::Int(1)],
            vec![SortKey {
                column: 1,
                desc: false,
            }],
        )
        .unwrap_err();
        assert_eq!(Some("1"), err.get_field("column"));
    }
}
