//! Compiles a script, runs it on a `tiny-runtime` state-thread, and checks
//! the observable outcome — the six scenarios a host embedding Tiny needs to
//! be able to rely on.

use std::rc::Rc;
use tiny_core::Value;
use tiny_runtime::{NativeTable, ThreadConfig, Vm};
use tinyc::{CompilerConfig, State};

fn compiled(source: &str) -> State {
    let mut state = State::new(CompilerConfig::default());
    state
        .compile_string("<test>", source)
        .unwrap_or_else(|e| panic!("{}", state.render_error(&e)));
    state
}

fn run_to_completion(state: &State) -> Vm {
    let program = Rc::new(state.export_program());
    let natives = Rc::new(NativeTable::new(state.foreign_function_count()));
    let mut vm = Vm::new(program, natives, ThreadConfig::default());
    vm.start();
    while vm.execute_cycle().expect("script must not fault") {}
    vm
}

#[test]
fn add_called_from_host_returns_thirty() {
    let state = compiled("func add(x: int, y: int): int { return x + y } add(10, 20)");
    let mut vm = run_to_completion(&state);
    let add_idx = state.get_function_index("add").expect("add must be declared");
    let result = vm.call_function(add_idx, &[Value::Int(10), Value::Int(20)]).unwrap();
    assert_eq!(result, Value::Int(30));
}

#[test]
fn factorial_of_five_is_120() {
    let state = compiled(
        "func fact(n: int): int { if n <= 1 return 1 return n * fact(n - 1) }",
    );
    let mut vm = run_to_completion(&state);
    let fact_idx = state.get_function_index("fact").unwrap();
    let result = vm.call_function(fact_idx, &[Value::Int(5)]).unwrap();
    assert_eq!(result, Value::Int(120));
    assert!(vm.is_live(), "a completed call_function must leave the thread live");
}

#[test]
fn struct_constructor_populates_fields_in_order() {
    let state = compiled("struct P { x: int y: int } func f(): P { return new P{3, 4} }");
    let mut vm = run_to_completion(&state);
    let f_idx = state.get_function_index("f").unwrap();
    let result = vm.call_function(f_idx, &[]).unwrap();
    let Value::Struct(ptr) = result else {
        panic!("expected a struct, got {result:?}");
    };
    let fields = unsafe { (*ptr).as_struct() }.unwrap();
    assert_eq!(fields, &[Value::Int(3), Value::Int(4)]);
}

#[test]
fn break_exits_the_loop_after_one_iteration() {
    let state = compiled("x := 0 while x < 10 { x += 1 break }");
    let vm = run_to_completion(&state);
    let x_idx = state.get_global_index("x").unwrap();
    assert_eq!(vm.get_global(x_idx), Value::Int(1));
}

#[test]
fn continue_skips_the_second_increment_every_time() {
    let state = compiled("x := 0 while x < 10 { x += 1 if x < 10 continue x += 1 }");
    let vm = run_to_completion(&state);
    let x_idx = state.get_global_index("x").unwrap();
    assert_eq!(vm.get_global(x_idx), Value::Int(11));
}

#[test]
fn passing_a_float_where_an_int_is_expected_is_a_compile_error() {
    let mut state = State::new(CompilerConfig::default());
    let err = state
        .compile_string(
            "<test>",
            "func add(x: int, y: int): int { return x + y } add(10, 10.5)",
        )
        .unwrap_err();
    let rendered = state.render_error(&err);
    assert!(
        rendered.contains("Argument 2 is supposed to be int but you supplied a float."),
        "got: {rendered}"
    );
}
