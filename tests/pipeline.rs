use fx::config::presets;
use fx::{
    parse_program, EffectSet, FundamentalEffect, FxConfig, FxError, Operation, Outcome, Pipeline, PipelineStage,
    Program, RefId, Runtime, Signature, TaskStatus, Type, Value, ViolationKind,
};

const COUNTER: &str = include_str!("../demos/counter.json");

fn sig(name: &str, effects: &[FundamentalEffect]) -> Signature {
    Signature::new(name, vec![], Type::Unit, EffectSet::new(effects.iter().copied()).unwrap())
}

#[test]
fn test_counter_document_runs() {
    let program = parse_program(COUNTER).unwrap();
    assert_eq!(program.len(), 5);

    let report = Pipeline::new(FxConfig::default()).run(&program, "main", vec![]).unwrap();
    // try_bump always fails, so its increment is rolled back before main reads
    assert_eq!(report.outcome, Outcome::Succeeded(Value::Int(0)));
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].1, TaskStatus::Completed);
    assert!(report.diagnostics.is_empty());
}

#[test]
fn test_counter_heap_after_tasks() {
    let program = parse_program(COUNTER).unwrap();
    let main = program.lookup("main")[0];
    let mut runtime = Runtime::new(&program);
    runtime.run(main, vec![]).unwrap();

    // the worker bumped once and its deferred write landed
    assert_eq!(runtime.heap().read(RefId(0)).unwrap(), &Value::Int(1));
    assert_eq!(runtime.heap().read(RefId(1)).unwrap(), &Value::Int(1));
}

#[test]
fn test_check_stage() {
    let program = parse_program(COUNTER).unwrap();
    let result = Pipeline::new(FxConfig::default()).check(&program).unwrap();
    assert_eq!(result.stage, PipelineStage::Check);
    let worker = program.lookup("worker")[0];
    assert!(result.result.effects_of(worker).unwrap().suspends());
}

#[test]
fn test_violations_stop_the_pipeline() {
    let mut program = Program::new();
    let x = program.add_global("x", Value::Int(0));
    program.add_function(sig("main", &[]), Operation::write(x, Operation::lit(1)));

    let err = Pipeline::new(FxConfig::default()).run(&program, "main", vec![]).unwrap_err();
    match err {
        FxError::Violations(violations) => {
            assert_eq!(violations.len(), 1);
            assert!(matches!(violations[0].kind, ViolationKind::MissingEffects { .. }));
        }
        other => panic!("expected violations, got {other}"),
    }
}

#[test]
fn test_warnings_as_errors() {
    let mut program = Program::new();
    program.add_function(sig("legacy", &[FundamentalEffect::NoRollback]), Operation::unit());
    program.add_function(sig("main", &[]), Operation::unit());

    let lenient = Pipeline::new(FxConfig::default()).run(&program, "main", vec![]).unwrap();
    assert_eq!(lenient.diagnostics.len(), 1);

    let mut config = FxConfig::default();
    config.checker.warnings_as_errors = true;
    let err = Pipeline::new(config).run(&program, "main", vec![]).unwrap_err();
    assert!(matches!(err, FxError::WarningsDenied { count: 1 }));

    // strict also refuses the legacy effect outright
    let err = Pipeline::new(presets::strict()).run(&program, "main", vec![]).unwrap_err();
    assert!(matches!(err, FxError::Violations(_)));
}

#[test]
fn test_entry_resolution() {
    let mut program = Program::new();
    program.add_function(sig("twice", &[]), Operation::unit());
    program.add_function(
        Signature::new("twice", vec![Type::named("int")], Type::Unit, EffectSet::pure()),
        Operation::unit(),
    );

    let pipeline = Pipeline::new(FxConfig::default());
    assert!(matches!(
        pipeline.run(&program, "missing", vec![]),
        Err(FxError::UnknownEntry { .. })
    ));
    assert!(matches!(
        pipeline.run(&program, "twice", vec![]),
        Err(FxError::AmbiguousEntry { count: 2, .. })
    ));
}

#[test]
fn test_bad_document() {
    assert!(matches!(parse_program("{\"functions\": 3}"), Err(FxError::Document { .. })));
}

#[test]
fn test_step_limit_from_config() {
    let mut program = Program::new();
    let spin = program.declare(sig("spin", &[FundamentalEffect::MayDiverge]));
    assert!(program.define(spin, Operation::call(spin, vec![])));

    let mut config = FxConfig::default();
    config.runtime.step_limit = Some(50);
    let mut runtime = Runtime::with_config(&program, &config);
    assert!(matches!(
        runtime.run(spin, vec![]),
        Err(FxError::Runtime(fx::RuntimeError::StepLimitExceeded { limit: 50 }))
    ));
}
