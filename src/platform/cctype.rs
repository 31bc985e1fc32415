//! ctype.h shims

use crate::interpreter::errors::Result;
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::values::Value;
use crate::platform::library::{LibraryBundle, LibraryEntry};

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "ctype.h",
        setup: None,
        entries: vec![
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_alphanumeric()),
                prototype: "int isalnum(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_alphabetic()),
                prototype: "int isalpha(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c == b' ' || c == b'\t'),
                prototype: "int isblank(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_control()),
                prototype: "int iscntrl(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_digit()),
                prototype: "int isdigit(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_graphic()),
                prototype: "int isgraph(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_lowercase()),
                prototype: "int islower(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_graphic() || c == b' '),
                prototype: "int isprint(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_punctuation()),
                prototype: "int ispunct(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_whitespace()),
                prototype: "int isspace(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_uppercase()),
                prototype: "int isupper(int);",
            },
            LibraryEntry {
                native: |i, p, r, a| classify(i, p, r, a, |c| c.is_ascii_hexdigit()),
                prototype: "int isxdigit(int);",
            },
            LibraryEntry {
                native: lib_tolower,
                prototype: "int tolower(int);",
            },
            LibraryEntry {
                native: lib_toupper,
                prototype: "int toupper(int);",
            },
        ],
        defs: None,
    }
}

fn classify(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
    predicate: fn(u8) -> bool,
) -> Result<()> {
    let value = instance.value_int(parser, &args[0])?;
    let result = u8::try_from(value).map(predicate).unwrap_or(false);
    instance.set_value_int(parser, ret, i64::from(result))
}

fn lib_tolower(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_int(parser, &args[0])?;
    let result = u8::try_from(value)
        .map(|byte| byte.to_ascii_lowercase() as i64)
        .unwrap_or(value);
    instance.set_value_int(parser, ret, result)
}

fn lib_toupper(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_int(parser, &args[0])?;
    let result = u8::try_from(value)
        .map(|byte| byte.to_ascii_uppercase() as i64)
        .unwrap_or(value);
    instance.set_value_int(parser, ret, result)
}
