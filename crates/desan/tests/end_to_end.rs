use desan::core::AnalysisError;
use desan::{
    optimize_ir_file, optimize_text, AnalysisConfig, MarkingPolicy, PipelineError, RemovalStrategy,
};
use pretty_assertions::assert_eq;

const GEP_DERIVED: &str = r#"define void @f(ptr %p) {
entry:
  call void @__asan_load8(ptr %p)
  %q = getelementptr inbounds i8, ptr %p, i64 4
  call void @__asan_load8(ptr %q)
  %v = load i64, ptr %q, align 8
  ret void
}
"#;

const SHARED_GLOBAL: &str = r#"@buf = global [16 x i32] zeroinitializer, align 16

define i32 @first() {
entry:
  call void @__asan_load4(ptr @buf)
  %x = load i32, ptr @buf, align 16
  ret i32 %x
}

define i32 @second() {
entry:
  call void @__asan_load4(ptr @buf)
  %y = load i32, ptr @buf, align 16
  ret i32 %y
}

declare void @__asan_load4(ptr)
"#;

/// The middle check overlaps both ends; the ends share nothing.
const CHAIN: &str = r#"define void @chain(ptr %a, ptr %b) {
entry:
  call void @__asan_load8(ptr %a)
  call void @__asan_loadN(ptr %a, ptr %b)
  call void @__asan_load8(ptr %b)
  ret void
}
"#;

/// Only the first and last checks share a literal of the same type.
const TYPED_LITERALS: &str = r#"define void @lit() {
entry:
  call void @__asan_loadN(i64 1, i64 8)
  call void @__asan_loadN(i32 1, i32 8)
  call void @__asan_loadN(i64 1, i64 4)
  ret void
}
"#;

fn keys(config: &AnalysisConfig, text: &str) -> Vec<String> {
    optimize_text(text, config)
        .unwrap()
        .redundant
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn gep_derived_check_is_removed() {
    let optimization = optimize_text(GEP_DERIVED, &AnalysisConfig::default()).unwrap();

    assert_eq!(optimization.removed(), 1);
    assert_eq!(optimization.redundant[0].to_string(), "@f:call1");
    let expected = GEP_DERIVED.replace("  call void @__asan_load8(ptr %q)\n", "");
    assert_eq!(optimization.text, expected);
    assert_eq!(
        optimization.text.lines().count(),
        GEP_DERIVED.lines().count() - 1
    );

    let base = &optimization.dependencies.checks["@f:call0"];
    assert_eq!(base.check, "@__asan_load8");
    assert_eq!(
        base.aliases["%p"].alias_set,
        vec!["@f:%p".to_string(), "@f:%q".to_string(), "@f:%v".to_string()]
    );
}

#[test]
fn store_through_the_pointer_keeps_every_check() {
    let text = GEP_DERIVED.replace(
        "  ret void\n",
        "  store i8 0, ptr %p, align 1\n  ret void\n",
    );
    let optimization = optimize_text(&text, &AnalysisConfig::default()).unwrap();

    assert!(optimization.redundant.is_empty());
    assert_eq!(optimization.text, text);
    assert!(optimization.dependencies.checks["@f:call0"].aliases["%p"].is_write);
    assert_eq!(optimization.report.kept, 2);
}

#[test]
fn checks_on_a_shared_global_are_redundant_across_functions() {
    assert_eq!(
        keys(&AnalysisConfig::default(), SHARED_GLOBAL),
        vec!["@second:call0"]
    );

    let guarded = AnalysisConfig {
        interprocedural_guard: true,
        ..AnalysisConfig::default()
    };
    assert!(keys(&guarded, SHARED_GLOBAL).is_empty());
}

#[test]
fn marking_policies_differ_on_a_chain() {
    let transitive = AnalysisConfig::default();
    assert_eq!(keys(&transitive, CHAIN), vec!["@chain:call1", "@chain:call2"]);

    let strict = AnalysisConfig {
        policy: MarkingPolicy::StrictPairwise,
        ..AnalysisConfig::default()
    };
    assert_eq!(keys(&strict, CHAIN), vec!["@chain:call1"]);
}

#[test]
fn literals_of_different_types_do_not_overlap() {
    assert_eq!(
        keys(&AnalysisConfig::default(), TYPED_LITERALS),
        vec!["@lit:call2"]
    );
    let optimization = optimize_text(TYPED_LITERALS, &AnalysisConfig::default()).unwrap();
    assert_eq!(
        optimization.dependencies.checks["@lit:call1"].operands,
        vec!["i32 1".to_string(), "i32 8".to_string()]
    );
}

#[test]
fn ranked_strategy_bounds_the_removal() {
    let text = format!("{}\n{}", GEP_DERIVED, CHAIN);
    let all = optimize_text(&text, &AnalysisConfig::default()).unwrap();
    assert_eq!(all.removed(), 3);

    let ranked = AnalysisConfig {
        strategy: RemovalStrategy::Ranked { limit: 1 },
        ..AnalysisConfig::default()
    };
    let bounded = optimize_text(&text, &ranked).unwrap();
    assert_eq!(bounded.removed(), 1);
    assert!(all.redundant.contains(&bounded.redundant[0]));
    assert_eq!(
        bounded.text.lines().count(),
        text.lines().count() - 1
    );
}

#[test]
fn analysis_is_deterministic() {
    let text = format!("{}\n{}\n{}", GEP_DERIVED, SHARED_GLOBAL, CHAIN);
    let config = AnalysisConfig::default();
    let first = optimize_text(&text, &config).unwrap();
    let second = optimize_text(&text, &config).unwrap();
    assert_eq!(first.redundant, second.redundant);
    assert_eq!(first.text, second.text);
    assert_eq!(first.dependencies, second.dependencies);
}

#[test]
fn rewrite_only_touches_redundant_call_lines() {
    let text = format!("{}\n{}", SHARED_GLOBAL, CHAIN);
    let optimization = optimize_text(&text, &AnalysisConfig::default()).unwrap();

    let original: Vec<&str> = text.lines().collect();
    let rewritten: Vec<&str> = optimization.text.lines().collect();
    assert_eq!(original.len() - rewritten.len(), optimization.removed());

    // Every surviving line appears in the original, in order.
    let mut cursor = original.iter();
    for line in &rewritten {
        assert!(cursor.any(|candidate| candidate == line), "unexpected line: {line}");
    }
    let checks = original
        .iter()
        .filter(|line| line.trim_start().starts_with("call void @__asan"))
        .count();
    assert_eq!(
        checks - optimization.removed(),
        rewritten
            .iter()
            .filter(|line| line.trim_start().starts_with("call void @__asan"))
            .count()
    );
}

#[test]
fn a_check_hidden_from_the_parser_is_rejected() {
    // The parser drops the malformed define, so the rewriter sees calls the extractor never did.
    let text = format!(
        "{}\ndefine void @broken(ptr %p {{\nentry:\n  call void @__asan_load8(ptr %p)\n  ret void\n}}\n",
        GEP_DERIVED
    );
    match optimize_text(&text, &AnalysisConfig::default()) {
        Err(PipelineError::Analysis(AnalysisError::OrdinalMismatch {
            function,
            seen,
            extracted,
        })) => {
            assert_eq!(function, "@broken");
            assert_eq!((seen, extracted), (1, 0));
        }
        Err(PipelineError::Parse(_)) => {}
        other => panic!("expected the rewrite to be rejected, got {:?}", other.map(|o| o.text)),
    }
}

#[test]
fn files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.ll");
    let output = dir.path().join("out/optimized.ll");
    std::fs::write(&input, GEP_DERIVED).unwrap();

    let optimization = optimize_ir_file(&input, &output, &AnalysisConfig::default()).unwrap();
    assert_eq!(std::fs::read_to_string(&output).unwrap(), optimization.text);
    assert_eq!(
        optimization.report.source.as_deref(),
        Some(input.display().to_string().as_str())
    );
}
