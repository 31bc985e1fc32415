// Scope lifecycle tests: hiding, revival, statics, and redefinition rules

use minic::{CaptureIo, InterpError, Interpreter};

fn run(source: &str) -> (Result<(), InterpError>, String) {
    let (io, output) = CaptureIo::new();
    let mut interpreter = Interpreter::with_io(128 * 1024, Box::new(io));
    interpreter
        .include_all_system_headers()
        .expect("library registration failed");
    let result = interpreter.parse("test.c", source, true, false, false);
    let text = output.borrow().clone();
    (result, text)
}

fn run_ok(source: &str) -> String {
    let (result, output) = run(source);
    assert!(result.is_ok(), "execution failed: {:?}", result);
    output
}

#[test]
fn block_locals_die_at_the_closing_brace() {
    let (result, _) = run(
        r#"
        { int inner = 1; }
        int x = inner;
        "#,
    );
    let error = result.expect_err("inner should not be visible");
    assert!(
        error.to_string().contains("out of scope"),
        "hidden names get the distinct diagnostic, got: {}",
        error
    );
}

#[test]
fn never_defined_names_are_undefined_not_out_of_scope() {
    let (result, _) = run("int x = was_never_here;");
    let error = result.expect_err("should fail");
    assert!(error.to_string().contains("undefined"));
    assert!(!error.to_string().contains("out of scope"));
}

#[test]
fn reentering_a_block_revives_its_variable() {
    // the same declaration site is re-encountered every iteration without
    // a redefinition error
    let output = run_ok(
        r#"
        int i;
        int total = 0;
        for (i = 0; i < 4; i++) {
            int t = i;
            total = total + t;
        }
        printf("%d\n", total);
        "#,
    );
    assert_eq!(output, "6\n");
}

#[test]
fn redeclaration_at_a_different_site_is_a_name_error() {
    let (result, _) = run("int x = 1;\nint x = 2;\n");
    let error = result.expect_err("redefinition should fail");
    assert!(
        error.to_string().contains("already defined"),
        "wrong diagnostic: {}",
        error
    );
}

#[test]
fn static_payload_address_is_stable_across_calls() {
    let output = run_ok(
        r#"
        int addr(void) {
            static int keep = 0;
            return (int)&keep;
        }
        printf("%d\n", addr() == addr());
        "#,
    );
    assert_eq!(output, "1\n");
}

#[test]
fn static_initializer_runs_once() {
    let output = run_ok(
        r#"
        int next(void) {
            static int n = 100;
            n = n + 1;
            return n;
        }
        next();
        next();
        printf("%d\n", next());
        "#,
    );
    assert_eq!(output, "103\n");
}

#[test]
fn statics_in_different_functions_are_distinct() {
    let output = run_ok(
        r#"
        int a(void) { static int k = 0; k++; return k; }
        int b(void) { static int k = 0; k++; return k; }
        a(); a(); a();
        printf("%d %d\n", a(), b());
        "#,
    );
    assert_eq!(output, "4 1\n");
}

#[test]
fn locals_shadow_globals() {
    let output = run_ok(
        r#"
        int x = 1;
        int probe(void) {
            int x = 2;
            return x;
        }
        printf("%d %d\n", probe(), x);
        "#,
    );
    assert_eq!(output, "2 1\n");
}

#[test]
fn function_locals_are_per_call() {
    let output = run_ok(
        r#"
        int deepen(int n) {
            int mine = n;
            if (n > 0) deepen(n - 1);
            return mine;
        }
        printf("%d\n", deepen(5));
        "#,
    );
    assert_eq!(output, "5\n");
}

#[test]
fn out_of_scope_pointer_write_is_rejected_too() {
    let (result, _) = run(
        r#"
        int *p = 0;
        { int q = 1; p = &q; }
        *p = 9;
        "#,
    );
    let error = result.expect_err("writing a dead block should fail");
    assert!(error.to_string().contains("out of scope"));
}

#[test]
fn revival_makes_the_pointer_valid_again() {
    let output = run_ok(
        r#"
        int *p = 0;
        int i;
        int sum = 0;
        for (i = 0; i < 2; i++) {
            int q = i + 10;
            p = &q;
            sum = sum + *p;
        }
        printf("%d\n", sum);
        "#,
    );
    assert_eq!(output, "21\n");
}

#[test]
fn parameters_are_local_to_the_frame() {
    let (result, _) = run(
        r#"
        int id(int n) { return n; }
        id(5);
        int x = n;
        "#,
    );
    assert!(result.is_err(), "parameter must not leak out of the call");
}
