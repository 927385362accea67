use glaredb_error::{DbError, Result, ResultExt};
use hashbrown::HashSet;
use tracing::{debug, trace};

use crate::ast::{Block, Decl, Expr, FunctionDecl, Stmt, StructDecl, Type};
use crate::codegen::CodeGen;
use crate::pipeline::{Pipeline, PipelineIndex};
use crate::program::{ExecutionMode, PipelineInfo, Program};

/// All pipelines for a single query, compiled together into one program.
///
/// Pipelines are executed in the order they're pushed, so pipelines that
/// materialize input for other pipelines (hash aggregate and sort builds)
/// must be pushed before the pipelines reading from them.
#[derive(Debug)]
pub struct PlanFragment<'a> {
    codegen: &'a CodeGen,
    pipelines: Vec<Pipeline<'a>>,
}

impl<'a> PlanFragment<'a> {
    pub fn new(codegen: &'a CodeGen) -> Self {
        PlanFragment {
            codegen,
            pipelines: Vec::new(),
        }
    }

    /// Push a pipeline to the end of the fragment.
    ///
    /// The pipeline must have been built against the same context as the
    /// fragment, and must not have been produced yet.
    pub fn push_pipeline(&mut self, pipeline: Pipeline<'a>) -> Result<()> {
        if !std::ptr::eq(pipeline.codegen(), self.codegen) {
            return Err(DbError::new(
                "Pipeline built with a different codegen context than the fragment",
            ));
        }
        if let Some(index) = pipeline.index() {
            return Err(
                DbError::new("Cannot push a pipeline that has already been produced")
                    .with_field("index", index),
            );
        }

        self.pipelines.push(pipeline);
        Ok(())
    }

    /// Create a new empty pipeline at the end of the fragment.
    pub fn new_pipeline(&mut self) -> &mut Pipeline<'a> {
        self.pipelines.push(Pipeline::new(self.codegen));
        let last = self.pipelines.len() - 1;
        &mut self.pipelines[last]
    }

    pub fn num_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn pipelines(&self) -> &[Pipeline<'a>] {
        &self.pipelines
    }

    /// Compile every pipeline in the fragment.
    ///
    /// The program contains the declarations contributed by operators, the
    /// query state struct, setup and teardown functions, a function per
    /// pipeline, and an entry function running everything in order.
    ///
    /// Any error aborts the entire compilation.
    pub fn compile(mut self) -> Result<Program> {
        let codegen = self.codegen;
        codegen
            .config()
            .validate()
            .context("Invalid compiler config")?;

        let mut operator_decls = Vec::new();
        let mut state_fields = Vec::new();
        let mut setup_stmts = Vec::new();
        let mut teardown_stmts = Vec::new();

        for (idx, pipeline) in self.pipelines.iter_mut().enumerate() {
            pipeline
                .initialize(
                    &mut operator_decls,
                    &mut state_fields,
                    &mut setup_stmts,
                    &mut teardown_stmts,
                )
                .context_fn(|| format!("Failed to initialize pipeline {idx}"))?;
        }

        trace!(
            num_decls = operator_decls.len(),
            num_state_fields = state_fields.len(),
            num_setup = setup_stmts.len(),
            num_teardown = teardown_stmts.len(),
            "initialized pipelines"
        );

        let setup_name = codegen.new_identifier("setup");
        let teardown_name = codegen.new_identifier("teardown");
        let entry_name = codegen.new_identifier("main");

        let mut decls = operator_decls;
        decls.push(Decl::Struct(StructDecl {
            name: codegen.state_type().clone(),
            fields: state_fields,
        }));
        decls.push(Decl::Function(FunctionDecl {
            name: setup_name.clone(),
            params: codegen.pipeline_params(),
            ret: Type::Nil,
            body: Block::new(setup_stmts),
        }));
        decls.push(Decl::Function(FunctionDecl {
            name: teardown_name.clone(),
            params: codegen.pipeline_params(),
            ret: Type::Nil,
            body: Block::new(teardown_stmts),
        }));

        let mut infos = Vec::with_capacity(self.pipelines.len());
        for (idx, pipeline) in self.pipelines.iter_mut().enumerate() {
            let index =
                PipelineIndex(u32::try_from(idx).context("Too many pipelines in fragment")?);
            let decl = pipeline
                .produce(index)
                .context_fn(|| format!("Failed to produce pipeline {idx}"))?;

            let mode = ExecutionMode::new(
                codegen.config(),
                pipeline.is_vectorizable(),
                pipeline.is_parallelizable(),
            );
            debug!(pipeline = %decl.name(), %mode, "compiled pipeline");

            infos.push(PipelineInfo {
                index,
                name: decl.name().clone(),
                is_vectorizable: pipeline.is_vectorizable(),
                is_parallelizable: pipeline.is_parallelizable(),
                mode,
            });
            decls.push(decl);
        }

        // Entry function, declares the state on the stack and runs
        // everything.
        let state = codegen.state_param();
        let state_ptr = Expr::ident(state).address_of();
        let mut entry_stmts = vec![
            Stmt::declare(state, Some(Type::named(codegen.state_type())), None),
            Stmt::Expr(Expr::call(&setup_name, [state_ptr.clone()])),
        ];
        entry_stmts.extend(
            infos
                .iter()
                .map(|info| Stmt::Expr(Expr::call(&info.name, [state_ptr.clone()]))),
        );
        entry_stmts.push(Stmt::Expr(Expr::call(&teardown_name, [state_ptr])));

        decls.push(Decl::Function(FunctionDecl {
            name: entry_name.clone(),
            params: Vec::new(),
            ret: Type::Nil,
            body: Block::new(entry_stmts),
        }));

        verify_unique_decls(&decls)?;

        Ok(Program {
            decls,
            pipelines: infos,
            entry: entry_name,
        })
    }
}

/// Check that no two top-level declarations share a name.
fn verify_unique_decls(decls: &[Decl]) -> Result<()> {
    let mut seen = HashSet::with_capacity(decls.len());
    for decl in decls {
        if !seen.insert(decl.name()) {
            return Err(DbError::new("Duplicate top-level declaration")
                .with_field("name", decl.name()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOperator;
    use crate::config::CompilerConfig;
    use crate::explain::ExplainConfig;
    use crate::testutil::MockTranslator;
    use crate::translator::filter::FilterTranslator;
    use crate::translator::hash_aggregate::{
        AggregateBuildTranslator,
        AggregateExpr,
        AggregateFunction,
    };
    use crate::translator::limit::LimitTranslator;
    use crate::translator::output::{OutputColumn, OutputTranslator};
    use crate::translator::projection::ProjectionTranslator;
    use crate::translator::seq_scan::SeqScanTranslator;
    use crate::translator::sort::{SortBuildTranslator, SortKey};

    #[test]
    fn empty_fragment() {
        let codegen = CodeGen::default();
        let program = PlanFragment::new(&codegen).compile().unwrap();

        assert!(program.pipelines.is_empty());
        let expected = "\
struct State {
}

fun setup(state: *State) -> nil {}

fun teardown(state: *State) -> nil {}

fun main() -> nil {
    var state: State
    setup(&state)
    teardown(&state)
}
";
        assert_eq!(expected, program.to_string());
    }

    #[test]
    fn scan_filter_aggregate_output() {
        logutil::init_test();

        // SELECT a, count(b) FROM t WHERE a > 10 GROUP BY a
        let codegen = CodeGen::default();
        let mut fragment = PlanFragment::new(&codegen);

        let scan = SeqScanTranslator::new(&codegen, "t");
        let filter = FilterTranslator::new(Expr::binary(
            BinaryOperator::Gt,
            scan.column(0),
            Expr::Int(10),
        ));
        let agg_build = AggregateBuildTranslator::new(
            &codegen,
            vec![scan.column(0)],
            vec![AggregateExpr {
                function: AggregateFunction::Count,
                input: scan.column(1),
            }],
        )
        .unwrap();
        let agg_scan = agg_build.scan_translator(&codegen);
        let output = OutputTranslator::new(
            &codegen,
            vec![
                OutputColumn {
                    name: "a".to_string(),
                    ty: Type::Int64,
                    expr: agg_scan.group(0).unwrap(),
                },
                OutputColumn {
                    name: "count".to_string(),
                    ty: Type::Int64,
                    expr: agg_scan.aggregate(0).unwrap(),
                },
            ],
        )
        .unwrap();

        // Build pipeline, sink first.
        let build = fragment.new_pipeline();
        build.add(Box::new(agg_build)).unwrap();
        build.add(Box::new(filter)).unwrap();
        build.add(Box::new(scan)).unwrap();

        let mut output_pipeline = Pipeline::new(&codegen);
        output_pipeline.add(Box::new(output)).unwrap();
        output_pipeline.add(Box::new(agg_scan)).unwrap();
        fragment.push_pipeline(output_pipeline).unwrap();

        let program = fragment.compile().unwrap();

        let expected = "\
struct AggPayload {
    group0: int64
    agg0: CountAggregate
}

fun aggKeyCheck(lhs: *AggPayload, rhs: *AggPayload) -> bool {
    return lhs.group0 == rhs.group0
}

struct OutputRow {
    a: int64
    count: int64
}

struct State {
    agg_ht: AggregationHashTable
    output_buffer: *OutputBuffer
}

fun setup(state: *State) -> nil {
    @aggHTInit(&state.agg_ht, @sizeOf(AggPayload))
    state.output_buffer = @resultBufferNew(@sizeOf(OutputRow))
}

fun teardown(state: *State) -> nil {
    @aggHTFree(&state.agg_ht)
    @resultBufferFinalize(state.output_buffer)
}

fun pipeline0(state: *State) -> nil {
    var tvi: TableVectorIterator
    @tableIterInit(&tvi, \"t\")
    for (@tableIterAdvance(&tvi)) {
        var pci = @tableIterGetPCI(&tvi)
        for (; @pciHasNext(pci); @pciAdvance(pci)) {
            if (@pciGetInt(pci, 0) > 10) {
                var agg_values: AggPayload
                agg_values.group0 = @pciGetInt(pci, 0)
                var agg_hash = @hash(agg_values.group0)
                var agg_payload: *AggPayload = @aggHTLookup(&state.agg_ht, agg_hash, aggKeyCheck, &agg_values)
                if (agg_payload == nil) {
                    agg_payload = @aggHTInsert(&state.agg_ht, agg_hash)
                    agg_payload.group0 = agg_values.group0
                    @aggInit(&agg_payload.agg0)
                }
                @aggAdvance(&agg_payload.agg0, @pciGetInt(pci, 1))
            }
        }
    }
    @tableIterClose(&tvi)
}

fun pipeline1(state: *State) -> nil {
    var agg_iter: AggregationHashTableIterator
    for (@aggHTIterInit(&agg_iter, &state.agg_ht); @aggHTIterHasNext(&agg_iter); @aggHTIterNext(&agg_iter)) {
        var agg_row: *AggPayload = @aggHTIterGetRow(&agg_iter)
        var out: *OutputRow = @resultBufferAllocRow(state.output_buffer)
        out.a = agg_row.group0
        out.count = @aggResult(&agg_row.agg0)
    }
    @aggHTIterClose(&agg_iter)
}

fun main() -> nil {
    var state: State
    setup(&state)
    pipeline0(&state)
    pipeline1(&state)
    teardown(&state)
}
";
        assert_eq!(expected, program.to_string());

        assert_eq!(2, program.pipelines.len());
        let p0 = program.get_pipeline(PipelineIndex(0)).unwrap();
        assert_eq!("pipeline0", p0.name.as_str());
        assert!(!p0.is_vectorizable);
        assert!(!p0.is_parallelizable);

        let p1 = program.get_pipeline(PipelineIndex(1)).unwrap();
        assert!(!p1.mode.vectorized);
        assert!(!p1.mode.parallel);

        assert_eq!("main", program.entry.as_str());
        assert!(program.get_decl("pipeline1").is_some());
    }

    #[test]
    fn sort_limit_pipelines() {
        // SELECT b, a * 2 FROM t ORDER BY b DESC LIMIT 5
        let codegen = CodeGen::default();
        let mut fragment = PlanFragment::new(&codegen);

        let scan = SeqScanTranslator::new(&codegen, "t");
        let proj = ProjectionTranslator::new(
            &codegen,
            [
                ("b", scan.column(1)),
                (
                    "a2",
                    Expr::binary(BinaryOperator::Mul, scan.column(0), Expr::Int(2)),
                ),
            ],
        )
        .unwrap();
        let sort_build = SortBuildTranslator::new(
            &codegen,
            vec![proj.column(0).unwrap(), proj.column(1).unwrap()],
            vec![SortKey {
                column: 0,
                desc: true,
            }],
        )
        .unwrap();
        let sort_scan = sort_build.scan_translator(&codegen);
        let limit = LimitTranslator::new(&codegen, 5).unwrap();
        let output = OutputTranslator::new(
            &codegen,
            vec![
                OutputColumn {
                    name: "b".to_string(),
                    ty: Type::Int64,
                    expr: sort_scan.column(0).unwrap(),
                },
                OutputColumn {
                    name: "a2".to_string(),
                    ty: Type::Int64,
                    expr: sort_scan.column(1).unwrap(),
                },
            ],
        )
        .unwrap();

        let build = fragment.new_pipeline();
        build.add(Box::new(sort_build)).unwrap();
        build.add(Box::new(proj)).unwrap();
        build.add(Box::new(scan)).unwrap();

        let scan_pipeline = fragment.new_pipeline();
        scan_pipeline.add(Box::new(output)).unwrap();
        scan_pipeline.add(Box::new(limit)).unwrap();
        scan_pipeline.add(Box::new(sort_scan)).unwrap();

        let program = fragment.compile().unwrap();

        let p0 = &program.pipelines[0];
        assert!(p0.is_vectorizable);
        assert!(!p0.is_parallelizable);
        assert_eq!(
            ExecutionMode {
                vectorized: true,
                parallel: false,
                batch_size: crate::config::DEFAULT_BATCH_SIZE,
            },
            p0.mode
        );

        let p1 = &program.pipelines[1];
        assert!(!p1.is_vectorizable);
        assert!(!p1.is_parallelizable);

        let expected = "\
fun pipeline1(state: *State) -> nil {
    @sorterSort(&state.sorter)
    var sort_iter: SorterIterator
    for (@sorterIterInit(&sort_iter, &state.sorter); @sorterIterHasNext(&sort_iter); @sorterIterNext(&sort_iter)) {
        var sort_out: *SortRow = @sorterIterGetRow(&sort_iter)
        if (state.limit_count < 5) {
            state.limit_count = state.limit_count + 1
            var out: *OutputRow = @resultBufferAllocRow(state.output_buffer)
            out.b = sort_out.col0
            out.a2 = sort_out.col1
        }
    }
    @sorterIterClose(&sort_iter)
}";
        assert_eq!(
            expected,
            program.get_decl("pipeline1").unwrap().to_string()
        );

        let state = program.get_decl("State").unwrap().to_string();
        assert_eq!(
            "struct State {\n    sorter: Sorter\n    output_buffer: *OutputBuffer\n    limit_count: int64\n}",
            state
        );

        assert!(program.get_decl("sortCompare").is_some());
    }

    #[test]
    fn config_gates_mode_not_flags() {
        let codegen = CodeGen::new(CompilerConfig {
            enable_vectorization: false,
            enable_parallelism: true,
            batch_size: 32,
        });
        let mut fragment = PlanFragment::new(&codegen);
        let pipeline = fragment.new_pipeline();
        pipeline.add(MockTranslator::new("a").boxed()).unwrap();

        let program = fragment.compile().unwrap();
        let info = &program.pipelines[0];

        assert!(info.is_vectorizable);
        assert!(info.is_parallelizable);
        assert!(!info.mode.vectorized);
        assert!(info.mode.parallel);
        assert_eq!(1, info.mode.batch_size);

        let explain: Vec<_> = program
            .explain(ExplainConfig::default())
            .into_iter()
            .map(|ent| ent.to_string())
            .collect();
        assert_eq!(
            vec!["Pipeline 0 (function = pipeline0, mode = parallel, row-at-a-time)"],
            explain
        );
    }

    #[test]
    fn invalid_config_rejected() {
        let codegen = CodeGen::new(CompilerConfig {
            batch_size: 0,
            ..Default::default()
        });
        let mut fragment = PlanFragment::new(&codegen);
        fragment
            .new_pipeline()
            .add(MockTranslator::new("a").boxed())
            .unwrap();

        let err = fragment.compile().unwrap_err();
        assert_eq!("Invalid compiler config", err.get_msg());
    }

    #[test]
    fn initialize_failure_aborts() {
        let codegen = CodeGen::default();
        let mut fragment = PlanFragment::new(&codegen);
        fragment
            .new_pipeline()
            .add(MockTranslator::new("bad").with_fail_initialize().boxed())
            .unwrap();

        let err = fragment.compile().unwrap_err();
        assert_eq!("Failed to initialize pipeline 0", err.get_msg());
    }

    #[test]
    fn produce_failure_aborts() {
        let codegen = CodeGen::default();
        let mut fragment = PlanFragment::new(&codegen);
        fragment
            .new_pipeline()
            .add(MockTranslator::new("ok").boxed())
            .unwrap();
        fragment
            .new_pipeline()
            .add(MockTranslator::new("bad").with_fail_produce().boxed())
            .unwrap();

        let err = fragment.compile().unwrap_err();
        assert_eq!("Failed to produce pipeline 1", err.get_msg());
    }

    #[test]
    fn duplicate_decls_rejected() {
        let codegen = CodeGen::default();
        let mut fragment = PlanFragment::new(&codegen);

        // Both mocks declare a struct with the same name.
        fragment
            .new_pipeline()
            .add(MockTranslator::new("dup").with_contributions(1, 0, 0, 0).boxed())
            .unwrap();
        fragment
            .new_pipeline()
            .add(MockTranslator::new("dup").with_contributions(1, 0, 0, 0).boxed())
            .unwrap();

        let err = fragment.compile().unwrap_err();
        assert_eq!(Some("dup_decl0"), err.get_field("name"));
    }

    #[test]
    fn push_pipeline_checks() {
        let codegen = CodeGen::default();
        let other = CodeGen::default();
        let mut fragment = PlanFragment::new(&codegen);

        fragment.push_pipeline(Pipeline::new(&other)).unwrap_err();

        let mut produced = Pipeline::new(&codegen);
        produced.produce(PipelineIndex(0)).unwrap();
        fragment.push_pipeline(produced).unwrap_err();

        fragment.push_pipeline(Pipeline::new(&codegen)).unwrap();
        assert_eq!(1, fragment.num_pipelines());
    }
}
