use cellscript::core::symbols::{encode, Keyword, Role, SymbolTable};
use cellscript::{Error, ErrorKind, Execution, Interpreter, InterpreterOptions};

fn run_with(options: InterpreterOptions, readable: &str) -> Result<Execution, Error> {
    let cells = SymbolTable::standard().spell(readable);
    Interpreter::new().with_options(options).run_source(&cells)
}

fn run(readable: &str) -> Vec<String> {
    run_with(InterpreterOptions::default(), readable)
        .expect("program should run")
        .output_lines
}

fn runtime_kind(readable: &str) -> ErrorKind {
    match run_with(InterpreterOptions::default(), readable) {
        Err(Error::Runtime(e)) => e.kind,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn scenario_a_let_and_print() {
    let out = run(r#"
        let x = 2
        let y = 3
        print(x + y)
    "#);
    assert_eq!(out, vec!["5"]);
}

#[test]
fn scenario_b_function_call() {
    let out = run(r#"
        fn add(a, b) { return a + b }
        print(add(4, 5))
    "#);
    assert_eq!(out, vec!["9"]);
}

#[test]
fn scenario_c_while_loop() {
    let out = run(r#"
        let i = 0
        while i < 3 {
            print(i)
            i = i + 1
        }
    "#);
    assert_eq!(out, vec!["0", "1", "2"]);
}

#[test]
fn counter_closure_accumulates() {
    let out = run(r#"
        fn make_counter() {
            let count = 0
            return () => {
                count = count + 1
                return count
            }
        }
        let next = make_counter()
        next()
        next()
        print(next())
        let other = make_counter()
        print(other())
    "#);
    assert_eq!(out, vec!["3", "1"]);
}

#[test]
fn constants_are_immutable_but_shadowable() {
    let out = run(r#"
        const k = 1
        try { k = 2 } catch (e) { print(e) }
        if true {
            let k = 10
            print(k)
        }
        print(k)
    "#);
    assert_eq!(
        out,
        vec!["ConstReassignment: cannot assign to constant 'k'", "10", "1"]
    );
}

#[test]
fn mutation_is_visible_through_nested_scopes() {
    let out = run(r#"
        let v = 1
        fn bump() { v = v + 1 }
        bump()
        bump()
        print(v)
    "#);
    assert_eq!(out, vec!["3"]);
}

#[test]
fn classes_inherit_and_call_super() {
    let out = run(r#"
        class Animal {
            fn init(name) { this.name = name }
            fn speak() { return this.name + " makes a sound" }
        }
        class Dog extends Animal {
            fn speak() { return super.speak() + " (woof)" }
        }
        let d = Dog("Rex")
        print(d.speak())
        print(d.name, type(d))
    "#);
    assert_eq!(out, vec!["Rex makes a sound (woof)", "Rex instance"]);
}

#[test]
fn for_each_over_arrays_maps_and_strings() {
    let out = run(r#"
        for v in [1, 2] { print(v) }
        let m = { b: 2, a: 1 }
        for pair in m { print(pair[0], pair[1]) }
        for ch in "hi" { print(ch) }
        for nothing in 42 { print("never") }
    "#);
    assert_eq!(out, vec!["1", "2", "a 1", "b 2", "h", "i"]);
}

#[test]
fn break_and_continue() {
    let out = run(r#"
        for n in range(10) {
            if n == 1 { continue }
            if n == 4 { break }
            print(n)
        }
    "#);
    assert_eq!(out, vec!["0", "2", "3"]);
}

#[test]
fn switch_matches_structurally() {
    let out = run(r#"
        fn describe(x) {
            switch x {
                case 1 { return "one" }
                case [1, 2] { return "pair" }
                default { return "other" }
            }
        }
        print(describe(1), describe([1, 2]), describe("z"))
    "#);
    assert_eq!(out, vec!["one pair other"]);
}

#[test]
fn yields_collect_into_an_array() {
    let out = run(r#"
        fn evens(n) {
            for i in range(n) { yield i * 2 }
        }
        print(evens(3))
        print(evens(0))
    "#);
    assert_eq!(out, vec!["[0, 2, 4]", "null"]);
}

#[test]
fn pipes_and_lambdas() {
    let out = run(r#"
        let double = x => x * 2
        let add = (a, b) => a + b
        print(3 |> double, add(1, 2))
        print(5 |> double |> double)
    "#);
    assert_eq!(out, vec!["6 3", "20"]);
}

#[test]
fn logical_operators_short_circuit() {
    let out = run(r#"
        fn boom() { print("evaluated") }
        print(false && boom(), true || boom(), 0 || "a")
    "#);
    assert_eq!(out, vec!["false true true"]);
}

#[test]
fn maps_arrays_and_indexing() {
    let out = run(r#"
        let xs = [1, 2, 3]
        xs[0] = 10
        push(xs, 4)
        let m = { name: "cell" }
        m.size = len(xs)
        m["kind"] = "demo"
        print(xs, xs.length, m)
        print(xs[9], m.missing)
    "#);
    assert_eq!(
        out,
        vec!["[10, 2, 3, 4] 4 {kind: demo, name: cell, size: 4}", "null null"]
    );
}

#[test]
fn imports_from_the_module_table() {
    let out = run(r#"
        import math
        import text
        print(math.sqrt(16), math.max(1, 5, 3), text.upper("abc"))
    "#);
    assert_eq!(out, vec!["4 5 ABC"]);
    assert_eq!(runtime_kind("import os"), ErrorKind::UnboundName);
}

#[test]
fn runtime_error_kinds() {
    assert_eq!(runtime_kind("print(missing)"), ErrorKind::UnboundName);
    assert_eq!(runtime_kind("print(1 / 0)"), ErrorKind::DivisionByZero);
    assert_eq!(runtime_kind("print(1 - \"a\")"), ErrorKind::TypeMismatch);
    assert_eq!(runtime_kind("const c = 1\nc = 2"), ErrorKind::ConstReassignment);
    assert_eq!(runtime_kind("let n = 3\nn()"), ErrorKind::TypeMismatch);
}

#[test]
fn halt_stops_without_error() {
    let exec = run_with(
        InterpreterOptions::default(),
        r#"
        print("before")
        try { halt } catch (e) { print("caught") }
        print("after")
    "#,
    )
    .unwrap();
    assert!(exec.halted);
    assert_eq!(exec.output_lines, vec!["before"]);
}

#[test]
fn loop_stops_at_the_iteration_cap() {
    let options = InterpreterOptions {
        max_loop_iterations: 5,
        ..InterpreterOptions::default()
    };
    let exec = run_with(
        options,
        r#"
        let n = 0
        loop { n = n + 1 }
        print(n)
    "#,
    )
    .unwrap();
    assert_eq!(
        exec.output_lines,
        vec!["[loop] iteration cap of 5 reached, exiting loop", "5"]
    );
}

#[test]
fn loop_exits_on_break() {
    let out = run(r#"
        let n = 0
        loop {
            n = n + 1
            if n >= 3 { break }
        }
        print(n)
    "#);
    assert_eq!(out, vec!["3"]);
}

#[test]
fn recursion_is_bounded_and_catchable() {
    let options = InterpreterOptions {
        max_call_depth: 20,
        ..InterpreterOptions::default()
    };
    let src = r#"
        fn down(n) { return down(n + 1) }
        try { down(0) } catch (e) { print(e) }
    "#;
    let exec = run_with(options.clone(), src).unwrap();
    assert_eq!(exec.output_lines, vec!["RecursionLimit: call depth exceeded 20"]);

    match run_with(options, "fn down(n) { return down(n + 1) }\ndown(0)") {
        Err(Error::Runtime(e)) => assert_eq!(e.kind, ErrorKind::RecursionLimit),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn recursion_within_limits_works() {
    let out = run(r#"
        fn fib(n) {
            if n < 2 { return n }
            return fib(n - 1) + fib(n - 2)
        }
        print(fib(15))
    "#);
    assert_eq!(out, vec!["610"]);
}

#[test]
fn missing_and_extra_arguments_are_tolerated() {
    let out = run(r#"
        fn pair(a, b) { return [a, b] }
        print(pair(1), pair(1, 2, 3))
    "#);
    assert_eq!(out, vec!["[1, null] [1, 2]"]);
}

#[test]
fn builtin_arity_is_checked() {
    assert_eq!(runtime_kind("len(1, 2)"), ErrorKind::TypeMismatch);
}

#[test]
fn reflect_runs_in_the_current_scope() {
    let out = run(r#"
        let a = 5
        print(reflect("a * 2"))
        reflect("let z = a + 1")
        print(z)
    "#);
    assert_eq!(out, vec!["10", "6"]);
}

#[test]
fn reflect_depth_is_bounded() {
    let out = run(r#"
        fn deep() { reflect("deep()") }
        try { deep() } catch (e) { print(e) }
    "#);
    assert_eq!(out, vec!["RecursionLimit: reflect depth exceeded 8"]);
}

#[test]
fn result_is_the_last_statement_value() {
    let exec = run_with(InterpreterOptions::default(), "let x = 20\nx + 1").unwrap();
    assert_eq!(exec.result.to_string(), "21");
    assert!(!exec.halted);
    assert!(exec.stats.statements >= 2);
}

#[test]
fn names_spelled_with_keyword_cells_bind_separately() {
    let table = SymbolTable::standard();
    let word = |a: Keyword, b: Keyword| -> String {
        [a, b].iter().filter_map(|k| table.symbol_of(Role::Keyword(*k))).collect()
    };
    let (first, second) = (word(Keyword::Let, Keyword::Const), word(Keyword::Fn, Keyword::Async));
    let cells = table
        .spell("const AAA = 1\nconst BBB = 2\nprint(AAA, BBB)")
        .replace(&encode("AAA"), &first)
        .replace(&encode("BBB"), &second);
    let exec = Interpreter::new().run_source(&cells).unwrap();
    assert_eq!(exec.output_lines, vec!["1 2"]);
}

#[test]
fn deep_recursion_within_the_call_limit_runs_on_a_small_stack() {
    // Smaller than the default main-thread stack; recursion must not rely on it.
    let handle = std::thread::Builder::new()
        .stack_size(512 * 1024)
        .spawn(|| {
            let ok = run("fn f(n) { if n == 0 { return 0 }\nreturn f(n - 1) + 1 }\nprint(f(195))");
            let too_deep = runtime_kind("fn f(n) { return f(n + 1) + 1 }\nf(0)");
            (ok, too_deep)
        })
        .unwrap();
    let (ok, too_deep) = handle.join().expect("interpreter thread overflowed its stack");
    assert_eq!(ok, vec!["195"]);
    assert_eq!(too_deep, ErrorKind::RecursionLimit);
}

#[test]
fn self_containing_values_print_and_fail_cleanly() {
    let out = run(r#"
        let a = [1]
        push(a, a)
        print(a, len(a))
        let m = { n: 0 }
        m.me = m
        print(m)
        print(a == a)
    "#);
    assert_eq!(out, vec!["[1, [...]] 2", "{me: {...}, n: 0}", "true"]);

    let kind = runtime_kind("let a = [1]\npush(a, a)\nlet b = [1]\npush(b, b)\nprint(a == b)");
    assert_eq!(kind, ErrorKind::TypeMismatch);
    let kind = runtime_kind("let a = [1]\npush(a, a)\nprompt(\"{x}\", { x: a })");
    assert_eq!(kind, ErrorKind::TypeMismatch);
}

#[test]
fn range_refuses_bounds_it_cannot_count() {
    assert_eq!(run("print(range(3), range(2, 4))"), vec!["[0, 1, 2] [2, 3]"]);
    assert_eq!(
        runtime_kind("print(range(9007199254740992, 9007199254740994))"),
        ErrorKind::TypeMismatch
    );
    assert_eq!(runtime_kind("range(100000000)"), ErrorKind::TypeMismatch);
}
