use glaredb_error::Result;

use crate::ast::{Expr, Identifier, Stmt, Type};
use crate::codegen::CodeGen;
use crate::codegen::function_builder::FunctionBuilder;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::translator::OperatorTranslator;

/// Sequential scan over a table, always the source of a pipeline.
///
/// Iterates over every vector of the table, then over every row in the
/// vector.
#[derive(Debug)]
pub struct SeqScanTranslator {
    table: String,
    /// Table vector iterator.
    tvi: Identifier,
    /// Projected columns iterator for the current vector.
    pci: Identifier,
    tvi_type: Identifier,
}

impl SeqScanTranslator {
    pub fn new(codegen: &CodeGen, table: impl Into<String>) -> Self {
        SeqScanTranslator {
            table: table.into(),
            tvi: codegen.new_identifier("tvi"),
            pci: codegen.new_identifier("pci"),
            tvi_type: codegen.identifier("TableVectorIterator"),
        }
    }

    /// Expression reading a column of the current row.
    pub fn column(&self, idx: usize) -> Expr {
        Expr::builtin("pciGetInt", [Expr::ident(&self.pci), Expr::Int(idx as i64)])
    }
}

impl Explainable for SeqScanTranslator {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("SeqScan").with_value("table", &self.table)
    }
}

impl OperatorTranslator for SeqScanTranslator {
    fn is_vectorizable(&self) -> bool {
        true
    }

    fn is_parallelizable(&self) -> bool {
        true
    }

    fn produce(&self, _codegen: &CodeGen, builder: &mut FunctionBuilder) -> Result<()> {
        let tvi_ptr = Expr::ident(&self.tvi).address_of();

        builder.append(Stmt::declare(
            &self.tvi,
            Some(Type::named(&self.tvi_type)),
            None,
        ));
        builder.append(Stmt::Expr(Expr::builtin(
            "tableIterInit",
            [tvi_ptr.clone(), Expr::String(self.table.clone())],
        )));

        // Loop over vectors.
        builder.start_for(
            None,
            Some(Expr::builtin("tableIterAdvance", [tvi_ptr.clone()])),
            None,
        );
        builder.defer(Stmt::Expr(Expr::builtin("tableIterClose", [tvi_ptr.clone()])));
        builder.append(Stmt::declare(
            &self.pci,
            None,
            Some(Expr::builtin("tableIterGetPCI", [tvi_ptr])),
        ));

        // Loop over rows in the vector.
        let pci = Expr::ident(&self.pci);
        builder.start_for(
            None,
            Some(Expr::builtin("pciHasNext", [pci.clone()])),
            Some(Stmt::Expr(Expr::builtin("pciAdvance", [pci]))),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::produce_to_string;

    #[test]
    fn scan_loops() {
        let codegen = CodeGen::default();
        let scan = SeqScanTranslator::new(&codegen, "lineitem");

        let out = produce_to_string(&codegen, &scan);
        let expected = "\
fun test(state: *State) -> nil {
    var tvi: TableVectorIterator
    @tableIterInit(&tvi, \"lineitem\")
    for (@tableIterAdvance(&tvi)) {
        var pci = @tableIterGetPCI(&tvi)
        for (; @pciHasNext(pci); @pciAdvance(pci)) {}
    }
    @tableIterClose(&tvi)
}";
        assert_eq!(expected, out);
    }

    #[test]
    fn two_scans_unique_iterators() {
        let codegen = CodeGen::default();
        let scan1 = SeqScanTranslator::new(&codegen, "a");
        let scan2 = SeqScanTranslator::new(&codegen, "b");

        assert_eq!("@pciGetInt(pci, 1)", scan1.column(1).to_string());
        assert_eq!("@pciGetInt(pci_1, 0)", scan2.column(0).to_string());
    }
}
