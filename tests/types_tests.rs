// Type system tests: interning, derived-type caching, aggregate layout

use minic::interpreter::table::{Interner, Symbol};
use minic::interpreter::types::{BaseType, TypeTree};
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
fn interner_returns_one_symbol_per_string() {
    let mut interner = Interner::new();
    let a = interner.register("offset");
    let b = interner.register("length");
    let c = interner.register("offset");
    assert_eq!(a, c);
    assert_ne!(a, b);
    assert_eq!(interner.resolve(a), "offset");
    assert_eq!(interner.register(""), Symbol::EMPTY);
}

#[test]
fn derived_types_are_created_once_per_tuple() {
    let mut types = TypeTree::new();
    let int_ptr = types.pointer_to(types.int_type);
    let int_ptr_again = types.pointer_to(types.int_type);
    assert_eq!(int_ptr, int_ptr_again);

    let arr_ten = types.array_of(types.int_type, 10);
    let arr_ten_again = types.array_of(types.int_type, 10);
    let arr_five = types.array_of(types.int_type, 5);
    assert_eq!(arr_ten, arr_ten_again);
    assert_ne!(arr_ten, arr_five);

    // different parents never share derived nodes
    let char_ptr = types.pointer_to(types.char_type);
    assert_ne!(int_ptr, char_ptr);
}

#[test]
fn fixed_scalar_sizes() {
    let types = TypeTree::new();
    assert_eq!(types.sizeof(types.char_type, true), 1);
    assert_eq!(types.sizeof(types.short_type, true), 2);
    assert_eq!(types.sizeof(types.int_type, true), 4);
    assert_eq!(types.sizeof(types.long_type, true), 8);
    assert_eq!(types.sizeof(types.fp_type, true), 8);
    assert_eq!(types.sizeof(types.char_ptr_type, true), 8);
}

#[test]
fn array_sizeof_scales_by_element() {
    let mut types = TypeTree::new();
    let arr = types.array_of(types.int_type, 6);
    assert_eq!(types.sizeof(arr, true), 24);
    assert_eq!(types.base(arr), BaseType::Array);
}

#[test]
fn struct_sizeof_is_a_multiple_of_its_alignment() {
    let output = run_ok(
        r#"
        struct A { char c; };
        struct B { char c; int i; };
        struct C { char c; int i; char d; };
        printf("%d %d %d\n", sizeof(struct A), sizeof(struct B), sizeof(struct C));
        "#,
    );
    // 1; 1 pad to 4 + 4 = 8; 1 pad 4 + 4 + 1 pad to 12
    assert_eq!(output, "1 8 12\n");
}

#[test]
fn struct_members_keep_declaration_order() {
    let output = run_ok(
        r#"
        struct S { int a; int b; int c; };
        struct S s;
        printf("%d %d %d\n",
            (int)&s.a - (int)&s,
            (int)&s.b - (int)&s,
            (int)&s.c - (int)&s);
        "#,
    );
    assert_eq!(output, "0 4 8\n");
}

#[test]
fn union_offsets_are_all_zero() {
    let output = run_ok(
        r#"
        union U { char c; int i; double d; };
        union U u;
        printf("%d %d %d\n",
            (int)&u.c - (int)&u,
            (int)&u.i - (int)&u,
            sizeof(union U));
        "#,
    );
    assert_eq!(output, "0 0 8\n");
}

#[test]
fn nested_structs_compose_layout() {
    let output = run_ok(
        r#"
        struct Inner { int a; int b; };
        struct Outer { char tag; struct Inner body; };
        struct Outer o;
        o.body.b = 7;
        printf("%d %d\n", sizeof(struct Outer), o.body.b);
        "#,
    );
    assert_eq!(output, "12 7\n");
}

#[test]
fn forward_declared_struct_works_through_a_pointer() {
    let output = run_ok(
        r#"
        struct Node;
        struct Node *head = 0;
        printf("%d\n", head == 0);
        "#,
    );
    assert_eq!(output, "1\n");
}

#[test]
fn forward_declared_struct_by_value_is_a_type_error() {
    let (result, _) = run(
        r#"
        struct Node;
        struct Node n;
        "#,
    );
    let error = result.expect_err("by-value use of a forward declaration must fail");
    assert!(
        error.to_string().contains("isn't defined"),
        "wrong diagnostic: {}",
        error
    );
}

#[test]
fn struct_redefinition_is_rejected() {
    let (result, _) = run(
        r#"
        struct P { int x; };
        struct P { int y; };
        "#,
    );
    let error = result.expect_err("struct redefinition must fail");
    assert!(error.to_string().contains("already defined"));
}

#[test]
fn self_referential_struct_through_pointer() {
    let output = run_ok(
        r#"
        struct Node { int value; struct Node *next; };
        struct Node a;
        struct Node b;
        a.value = 1;
        b.value = 2;
        a.next = &b;
        b.next = 0;
        printf("%d %d\n", a.next->value, sizeof(struct Node));
        "#,
    );
    assert_eq!(output, "2 16\n");
}

#[test]
fn unsigned_types_print_unsigned() {
    let output = run_ok(
        r#"
        unsigned int u = 0 - 1;
        printf("%u\n", u);
        "#,
    );
    assert_eq!(output, "4294967295\n");
}

#[test]
fn char_arithmetic_promotes_to_int() {
    let output = run_ok(
        r#"
        char c = 'A';
        printf("%d %c\n", c + 1, c + 1);
        "#,
    );
    assert_eq!(output, "66 B\n");
}

#[test]
fn casts_narrow_through_the_destination_width() {
    let output = run_ok(
        r#"
        int big = 300;
        char small = (char)big;
        printf("%d\n", small);
        "#,
    );
    assert_eq!(output, "44\n");
}

#[test]
fn sizeof_expression_uses_the_operand_type() {
    let output = run_ok(
        r#"
        double d;
        char c;
        printf("%d %d %d\n", sizeof(d), sizeof(c), sizeof(c + 0));
        "#,
    );
    assert_eq!(output, "8 1 4\n");
}
