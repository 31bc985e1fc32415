// End-to-end tests: parse-execute a program and check what it printed

use minic::{CaptureIo, InterpError, Interpreter};

/// Run top-level statements and return (result, captured output).
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

/// Run a program with a main() and return its captured output.
fn run_main(source: &str) -> String {
    let (io, output) = CaptureIo::new();
    let mut interpreter = Interpreter::with_io(128 * 1024, Box::new(io));
    interpreter
        .include_all_system_headers()
        .expect("library registration failed");
    interpreter
        .parse("test.c", source, true, false, false)
        .expect("parse failed");
    interpreter.call_main(&["test"]).expect("main failed");
    let text = output.borrow().clone();
    text
}

#[test]
fn assignment_and_arithmetic() {
    let output = run_ok("int x = 3; x = x + 4; printf(\"%d\\n\", x);");
    assert_eq!(output, "7\n");
}

#[test]
fn recursive_function() {
    let output = run_ok(
        r#"
        int f(int n) {
            if (n < 2) return n;
            return f(n-1) + f(n-2);
        }
        printf("%d\n", f(10));
        "#,
    );
    assert_eq!(output, "55\n");
}

#[test]
fn static_local_counts_across_calls() {
    // argument evaluation is left to right, so the calls print 1 2 3
    let output = run_ok(
        r#"
        int c(void) {
            static int k = 0;
            k++;
            return k;
        }
        printf("%d %d %d\n", c(), c(), c());
        "#,
    );
    assert_eq!(output, "1 2 3\n");
}

#[test]
fn struct_field_alignment_padding() {
    let output = run_ok(
        r#"
        struct P { char a; int b; };
        struct P p;
        printf("%d %d\n", (int)&p.a - (int)&p, (int)&p.b - (int)&p);
        "#,
    );
    assert_eq!(output, "0 4\n");
}

#[test]
fn loop_body_scope_and_loop_variable_survival() {
    let output = run_ok(
        r#"
        int i;
        for (i = 0; i < 3; i++) {
            int t = i * i;
            printf("%d ", t);
        }
        printf("%d\n", i);
        "#,
    );
    assert_eq!(output, "0 1 4 3\n");
}

#[test]
fn dangling_pointer_into_dead_block_is_out_of_scope() {
    let (result, _) = run(
        r#"
        int *p = 0;
        { int q = 5; p = &q; }
        int y = *p;
        "#,
    );
    let error = result.expect_err("reading a dead block should fail");
    assert!(
        error.to_string().contains("out of scope"),
        "wrong diagnostic: {}",
        error
    );
}

#[test]
fn while_loop_with_break_and_continue() {
    let output = run_ok(
        r#"
        int i = 0;
        int total = 0;
        while (i < 10) {
            i++;
            if (i == 3) continue;
            if (i == 6) break;
            total = total + i;
        }
        printf("%d %d\n", i, total);
        "#,
    );
    assert_eq!(output, "6 12\n");
}

#[test]
fn do_while_runs_at_least_once() {
    let output = run_ok(
        r#"
        int n = 10;
        do {
            printf("%d", n);
            n++;
        } while (n < 10);
        "#,
    );
    assert_eq!(output, "10");
}

#[test]
fn switch_matches_case_and_honours_break() {
    let output = run_ok(
        r#"
        int x = 2;
        switch (x) {
            case 1: printf("one"); break;
            case 2: printf("two"); break;
            default: printf("many");
        }
        "#,
    );
    assert_eq!(output, "two");
}

#[test]
fn switch_falls_through_without_break() {
    let output = run_ok(
        r#"
        int x = 1;
        switch (x) {
            case 1: printf("one ");
            case 2: printf("two ");
            default: printf("rest");
        }
        "#,
    );
    assert_eq!(output, "one two rest");
}

#[test]
fn switch_takes_default_when_nothing_matches() {
    let output = run_ok(
        r#"
        int x = 9;
        switch (x) {
            case 1: printf("one"); break;
            default: printf("default");
        }
        "#,
    );
    assert_eq!(output, "default");
}

#[test]
fn goto_forward_and_backward() {
    let output = run_main(
        r#"
        int main() {
            int i = 0;
        again:
            i++;
            if (i < 3) goto again;
            printf("%d\n", i);
            return 0;
        }
        "#,
    );
    assert_eq!(output, "3\n");
}

#[test]
fn goto_skips_forward_over_statements() {
    let output = run_main(
        r#"
        int main() {
            printf("a");
            goto past;
            printf("b");
        past:
            printf("c");
            return 0;
        }
        "#,
    );
    assert_eq!(output, "ac");
}

#[test]
fn pointers_and_dereference() {
    let output = run_ok(
        r#"
        int x = 41;
        int *p = &x;
        *p = *p + 1;
        printf("%d\n", x);
        "#,
    );
    assert_eq!(output, "42\n");
}

#[test]
fn pointer_arithmetic_is_scaled() {
    let output = run_ok(
        r#"
        int a[4];
        int i;
        for (i = 0; i < 4; i++) a[i] = i * 10;
        int *p = &a[0];
        printf("%d %d\n", *(p + 2), p[3]);
        "#,
    );
    assert_eq!(output, "20 30\n");
}

#[test]
fn array_initializer_list() {
    let output = run_ok(
        r#"
        int a[] = { 2, 4, 8 };
        printf("%d %d %d %d\n", a[0], a[1], a[2], sizeof(a) / sizeof(int));
        "#,
    );
    assert_eq!(output, "2 4 8 3\n");
}

#[test]
fn char_array_from_string_literal() {
    let output = run_ok(
        r#"
        char buf[16];
        strcpy(buf, "hello");
        printf("%s %d\n", buf, strlen(buf));
        "#,
    );
    assert_eq!(output, "hello 5\n");
}

#[test]
fn struct_member_assignment_and_copy() {
    let output = run_ok(
        r#"
        struct Point { int x; int y; };
        struct Point a;
        struct Point b;
        a.x = 3;
        a.y = 4;
        b = a;
        b.x = 9;
        printf("%d %d %d\n", a.x, b.x, b.y);
        "#,
    );
    assert_eq!(output, "3 9 4\n");
}

#[test]
fn struct_access_through_pointer() {
    let output = run_ok(
        r#"
        struct Point { int x; int y; };
        struct Point p;
        struct Point *q = &p;
        q->x = 12;
        printf("%d\n", p.x);
        "#,
    );
    assert_eq!(output, "12\n");
}

#[test]
fn union_members_overlay() {
    let output = run_ok(
        r#"
        union U { int i; char c; };
        union U u;
        u.i = 65;
        printf("%c %d\n", u.c, sizeof(union U));
        "#,
    );
    assert_eq!(output, "A 4\n");
}

#[test]
fn malloc_free_roundtrip() {
    let output = run_ok(
        r#"
        int *p = (int *)malloc(sizeof(int) * 3);
        p[0] = 1; p[1] = 2; p[2] = 3;
        printf("%d\n", p[0] + p[1] + p[2]);
        free(p);
        "#,
    );
    assert_eq!(output, "6\n");
}

#[test]
fn double_free_is_reported() {
    let (result, _) = run("int *p = (int *)malloc(8); free(p); free(p);");
    let error = result.expect_err("double free should fail");
    assert!(
        error.to_string().contains("double free"),
        "wrong diagnostic: {}",
        error
    );
}

#[test]
fn failed_calls_leave_the_stack_balanced() {
    // return slots and intrinsic argument temporaries sit below the frame
    // link, so error unwinding has to pop them explicitly; a long-running
    // host must not accumulate stack from ordinary failed calls
    let (io, _) = CaptureIo::new();
    let mut interpreter = Interpreter::with_io(128 * 1024, Box::new(io));
    interpreter.include_all_system_headers().unwrap();
    interpreter
        .parse(
            "test.c",
            "#define HALVE(q) q / 0\nint wreck(int n) { return n / (n - n); }",
            true,
            false,
            false,
        )
        .expect("definitions parse cleanly");

    let top = interpreter.arena.stack_top();
    for _ in 0..50 {
        // a scripted body failing mid-call
        let scripted = interpreter.parse("call.c", "wreck(4);", true, true, false);
        assert!(scripted.is_err());
        assert_eq!(interpreter.arena.stack_top(), top);

        // an intrinsic failing after its arguments are materialized
        let intrinsic = interpreter.parse("call.c", "printf(\"%d\");", true, true, false);
        assert!(intrinsic.is_err());
        assert_eq!(interpreter.arena.stack_top(), top);

        // a macro body failing inside its parameter frame
        let expanded = interpreter.parse("call.c", "HALVE(1);", true, true, false);
        assert!(expanded.is_err());
        assert_eq!(interpreter.arena.stack_top(), top);
    }
}

#[test]
fn enums_bind_integer_constants() {
    let output = run_ok(
        r#"
        enum Color { RED, GREEN = 5, BLUE };
        printf("%d %d %d\n", RED, GREEN, BLUE);
        "#,
    );
    assert_eq!(output, "0 5 6\n");
}

#[test]
fn typedef_declares_variables() {
    let output = run_ok(
        r#"
        typedef int counter;
        counter c = 7;
        printf("%d\n", c + 1);
        "#,
    );
    assert_eq!(output, "8\n");
}

#[test]
fn object_macro_expands_in_expressions() {
    let output = run_ok(
        r#"
        #define LIMIT 10
        printf("%d\n", LIMIT * 2);
        "#,
    );
    assert_eq!(output, "20\n");
}

#[test]
fn parameterized_macro_expands_with_arguments() {
    let output = run_ok(
        r#"
        #define ADD(a, b) a + b
        printf("%d\n", ADD(3, 4));
        "#,
    );
    assert_eq!(output, "7\n");
}

#[test]
fn conditional_inclusion_skips_dead_sections() {
    let output = run_ok(
        r#"
        #if 0
        printf("dead");
        #else
        printf("live");
        #endif
        #ifdef NEVER_DEFINED
        printf("also dead");
        #endif
        "#,
    );
    assert_eq!(output, "live");
}

#[test]
fn short_circuit_skips_untaken_side() {
    let output = run_ok(
        r#"
        int hits = 0;
        int bump(void) { hits++; return 1; }
        int a = 0 && bump();
        int b = 1 || bump();
        printf("%d %d %d\n", a, b, hits);
        "#,
    );
    assert_eq!(output, "0 1 0\n");
}

#[test]
fn ternary_evaluates_one_branch() {
    let output = run_ok(
        r#"
        int x = 5;
        printf("%d\n", x > 3 ? 100 : 200);
        "#,
    );
    assert_eq!(output, "100\n");
}

#[test]
fn division_by_zero_is_reported() {
    let (result, _) = run("int x = 1; int y = x / 0;");
    let error = result.expect_err("division by zero should fail");
    assert!(error.to_string().contains("division by zero"));
}

#[test]
fn undefined_name_is_reported() {
    let (result, _) = run("int x = nonsense;");
    let error = result.expect_err("undefined name should fail");
    assert!(error.to_string().contains("undefined"));
}

#[test]
fn skipped_branches_may_mention_unknown_names() {
    let output = run_ok(
        r#"
        if (0) { totally_undefined_function(1, 2); }
        else { printf("ok"); }
        "#,
    );
    assert_eq!(output, "ok");
}

#[test]
fn floating_point_arithmetic_and_printf() {
    let output = run_ok(
        r#"
        double d = 1.5;
        d = d * 2.0;
        printf("%.1f\n", d);
        "#,
    );
    assert_eq!(output, "3.0\n");
}

#[test]
fn math_library_functions() {
    let output = run_ok("printf(\"%.0f %.0f\\n\", sqrt(81.0), pow(2.0, 10.0));");
    assert_eq!(output, "9 1024\n");
}

#[test]
fn sprintf_writes_into_a_buffer() {
    let output = run_ok(
        r#"
        char buf[32];
        sprintf(buf, "x=%d", 42);
        puts(buf);
        "#,
    );
    assert_eq!(output, "x=42\n");
}

#[test]
fn ctype_classification() {
    let output = run_ok("printf(\"%d %d %d\\n\", isdigit('7'), isalpha('7'), toupper('a'));");
    assert_eq!(output, "1 0 65\n");
}

#[test]
fn errno_is_shared_host_state() {
    let output = run_ok(
        r#"
        errno = 0;
        double x = sqrt(-1.0);
        printf("%d\n", errno == EDOM);
        "#,
    );
    assert_eq!(output, "1\n");
}

#[test]
fn exit_sets_the_exit_value() {
    let (io, _) = CaptureIo::new();
    let mut interpreter = Interpreter::with_io(128 * 1024, Box::new(io));
    interpreter.include_all_system_headers().unwrap();
    interpreter
        .parse("test.c", "exit(3); printf(\"unreached\");", true, false, false)
        .expect("exit is not an error");
    assert_eq!(interpreter.exit_value(), 3);
}

#[test]
fn call_main_binds_argc_and_argv() {
    let (io, output) = CaptureIo::new();
    let mut interpreter = Interpreter::with_io(128 * 1024, Box::new(io));
    interpreter.include_all_system_headers().unwrap();
    interpreter
        .parse(
            "test.c",
            r#"
            int main(int argc, char **argv) {
                printf("%d %s %s\n", argc, argv[0], argv[1]);
                return 5;
            }
            "#,
            true,
            false,
            false,
        )
        .expect("parse failed");
    interpreter.call_main(&["prog", "hello"]).expect("main failed");
    assert_eq!(*output.borrow(), "2 prog hello\n");
    assert_eq!(interpreter.exit_value(), 5);
}

#[test]
fn scan_file_reads_from_disk() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "printf(\"from disk\");").expect("write");
    let path = file.path().to_str().expect("utf-8 path").to_string();

    let (io, output) = CaptureIo::new();
    let mut interpreter = Interpreter::with_io(128 * 1024, Box::new(io));
    interpreter.include_all_system_headers().unwrap();
    interpreter.scan_file(&path).expect("scan failed");
    assert_eq!(*output.borrow(), "from disk");
}

#[test]
fn breakpoints_report_through_the_host_stream() {
    let (io, output) = CaptureIo::new();
    let mut interpreter = Interpreter::with_io(128 * 1024, Box::new(io));
    interpreter.include_all_system_headers().unwrap();
    interpreter.breakpoint_set("test.c", 2, 1);
    assert_eq!(interpreter.breakpoint_count(), 1);
    interpreter
        .parse("test.c", "int x = 1;\nint y = 2;\n", true, false, true)
        .expect("parse failed");
    assert!(
        output.borrow().contains("break at test.c:2:1"),
        "missing break report in: {}",
        output.borrow()
    );
    assert!(interpreter.breakpoint_clear("test.c", 2, 1));
    assert_eq!(interpreter.breakpoint_count(), 0);
}

#[test]
fn cleanup_tears_down_and_leaves_a_usable_shell() {
    let (io, _) = CaptureIo::new();
    let mut interpreter = Interpreter::with_io(128 * 1024, Box::new(io));
    interpreter.include_all_system_headers().unwrap();
    interpreter
        .parse("test.c", "int x = 1;", true, false, false)
        .expect("parse failed");
    interpreter.cleanup();
    // everything is gone, including the old globals
    let result = interpreter.parse("again.c", "int y = x;", true, false, false);
    assert!(result.is_err(), "old globals must not survive cleanup");
}

#[test]
fn diagnostics_carry_file_line_and_column() {
    let (result, _) = run("int x = 1;\nint y = oops;\n");
    let error = result.expect_err("should fail");
    let location = error.location().expect("located error");
    assert_eq!(location.file, "test.c");
    assert_eq!(location.line, 2);
}

#[test]
fn function_prototype_then_definition() {
    let output = run_ok(
        r#"
        int twice(int n);
        printf("%d\n", 0);
        int twice(int n) { return n * 2; }
        printf("%d\n", twice(21));
        "#,
    );
    assert_eq!(output, "0\n42\n");
}

#[test]
fn compound_assignment_operators() {
    let output = run_ok(
        r#"
        int x = 8;
        x += 2; x *= 3; x -= 10; x /= 4;
        printf("%d\n", x);
        "#,
    );
    assert_eq!(output, "5\n");
}

#[test]
fn prefix_and_postfix_increment() {
    let output = run_ok(
        r#"
        int i = 5;
        printf("%d %d %d\n", i++, ++i, i);
        "#,
    );
    assert_eq!(output, "5 7 7\n");
}
