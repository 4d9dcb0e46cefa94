//! End-to-end behaviour of checking and running small programs

use fx::{
    EffectSet, FundamentalEffect::*, Operation, Outcome, Program, ProgramExt, Runtime, RuntimeError, Signature,
    TaskStatus, Type, Value, ViolationKind,
};

fn effects(list: &[fx::FundamentalEffect]) -> EffectSet {
    EffectSet::new(list.iter().copied()).unwrap()
}

fn sig(name: &str, list: &[fx::FundamentalEffect]) -> Signature {
    Signature::new(name, vec![], Type::Unit, effects(list))
}

#[test]
fn test_fewer_effects_are_usable_where_more_are_allowed() {
    let reads = effects(&[Reads]);
    let transacts = effects(&[Reads, Writes, Allocates]);
    assert!(reads.is_subset_of(&transacts));
    assert!(!effects(&[Writes]).is_subset_of(&reads));
}

#[test]
fn test_failed_condition_leaves_no_trace() {
    let mut program = Program::new();
    let x = program.add_global("x", Value::Int(1));
    // if (set x = 5; false) { 0 } else { x }
    let main = program.add_function(
        sig("main", &[Reads, Writes]),
        Operation::branch(
            Operation::Block(vec![Operation::write(x, Operation::lit(5)), Operation::lit(false)]),
            vec![Operation::lit(0)],
            vec![Operation::read(x)],
        ),
    );
    assert!(program.check().is_ok());

    let mut runtime = Runtime::new(&program);
    assert_eq!(runtime.run(main, vec![]).unwrap(), Outcome::Succeeded(Value::Int(1)));
    assert_eq!(runtime.heap().read(x).unwrap(), &Value::Int(1));
}

#[test]
fn test_not_of_failing_conjunction_succeeds_without_effects() {
    let mut program = Program::new();
    let x = program.add_global("x", Value::Int(0));
    let failing = program.add_function(sig("failing_call", &[MayFail]), Operation::fail());
    let main = program.add_function(
        sig("main", &[Writes, MayFail]),
        Operation::not(Operation::And(vec![
            Operation::write(x, Operation::lit(5)),
            Operation::call(failing, vec![]),
        ])),
    );
    assert!(program.check().is_ok());

    let mut runtime = Runtime::new(&program);
    assert_eq!(runtime.run(main, vec![]).unwrap(), Outcome::Succeeded(Value::Unit));
    assert_eq!(runtime.heap().read(x).unwrap(), &Value::Int(0));
}

#[test]
fn test_branch_join_of_function_types() {
    let reader = Type::function(vec![], Type::Unit, effects(&[Reads]));
    let writer = Type::function(vec![], Type::Unit, effects(&[Reads, Writes]));
    let joined = reader.join(&writer).unwrap();
    assert_eq!(joined.effects(), Some(effects(&[Reads, Writes])));
    assert!(reader.is_subtype_of(&joined));
    assert!(writer.is_subtype_of(&joined));
}

#[test]
fn test_join_rejects_suspending_and_fallible() {
    let fallible = effects(&[MayFail]);
    let suspending = effects(&[Suspends]);
    assert!(fallible.join(&suspending).is_err());
    // Union stays total; only the checked paths reject the mix.
    assert!(!fallible.union(&suspending).is_well_formed());
}

#[test]
fn test_checker_reports_then_runtime_defends() {
    let mut program = Program::new();
    let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
    let poll = program.add_function(
        sig("poll", &[Suspends]),
        Operation::Block(vec![Operation::branch(Operation::call(nap, vec![]), vec![], vec![])]),
    );

    let violations = program.check().unwrap_err();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::SuspendInSpeculativeScope);

    // Running the unchecked program still refuses to suspend mid-speculation.
    let mut runtime = Runtime::new(&program);
    let err = runtime.run(poll, vec![]).unwrap_err();
    assert!(matches!(
        err,
        fx::FxError::Runtime(RuntimeError::SuspensionInSpeculativeScope { .. })
    ));
}

#[test]
fn test_spawned_tasks_run_to_completion() {
    let mut program = Program::new();
    let x = program.add_global("x", Value::Int(0));
    let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
    let worker = program.add_function(
        sig("worker", &[Reads, Writes, Suspends]),
        Operation::Block(vec![
            Operation::suspend(nap, vec![]),
            Operation::write(x, Operation::add(Operation::read(x), Operation::lit(1))),
        ]),
    );
    let main = program.add_function(
        sig("main", &[Reads, Writes]),
        Operation::Block(vec![
            Operation::spawn(worker, vec![]),
            Operation::spawn(worker, vec![]),
            Operation::spawn(worker, vec![]),
        ]),
    );
    let summary = program.check().unwrap();
    assert_eq!(summary.required_of(main), Some(effects(&[Reads, Writes])));

    let mut runtime = Runtime::new(&program);
    runtime.run(main, vec![]).unwrap();
    assert_eq!(runtime.heap().read(x).unwrap(), &Value::Int(3));
    let coordinator = runtime.coordinator();
    for handle in coordinator.handles() {
        assert_eq!(coordinator.poll(handle).unwrap(), TaskStatus::Completed);
    }
}

#[test]
fn test_checked_program_suspends_mid_expression() {
    let mut program = Program::new();
    let x = program.add_global("x", Value::Int(0));
    let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
    let fetch = program.add_function(
        sig("fetch", &[Suspends]),
        Operation::Block(vec![Operation::suspend(nap, vec![]), Operation::lit(5)]),
    );
    let main = program.add_function(
        sig("main", &[Writes, Suspends]),
        Operation::Block(vec![Operation::write(x, Operation::call(fetch, vec![]))]),
    );
    assert!(program.check().is_ok());

    let mut runtime = Runtime::new(&program);
    assert_eq!(runtime.run(main, vec![]).unwrap(), Outcome::Succeeded(Value::Unit));
    assert_eq!(runtime.heap().read(x).unwrap(), &Value::Int(5));
}

#[test]
fn test_faulted_task_leaves_heap_untouched() {
    let mut program = Program::new();
    let x = program.add_global("x", Value::Int(0));
    let nap = program.add_function(sig("nap", &[Suspends]), Operation::unit());
    let bad = program.add_function(
        sig("bad", &[Reads, Writes, Suspends]),
        Operation::Block(vec![Operation::branch(
            Operation::And(vec![Operation::write(x, Operation::lit(5)), Operation::call(nap, vec![])]),
            vec![],
            vec![],
        )]),
    );

    let mut runtime = Runtime::new(&program);
    assert!(runtime.run(bad, vec![]).is_err());
    assert_eq!(runtime.heap().read(x).unwrap(), &Value::Int(0));
}
