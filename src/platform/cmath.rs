//! math.h shims
//!
//! Every function here is `double -> double` (or two doubles in), mapped
//! onto the host float operations. A domain error sets the scripted
//! `errno` to EDOM the way the C library would.

use crate::interpreter::errors::Result;
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::values::Value;
use crate::platform::cerrno::EDOM;
use crate::platform::library::{LibraryBundle, LibraryEntry};

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "math.h",
        setup: None,
        entries: vec![
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::sin),
                prototype: "double sin(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::cos),
                prototype: "double cos(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::tan),
                prototype: "double tan(double);",
            },
            LibraryEntry {
                native: lib_asin,
                prototype: "double asin(double);",
            },
            LibraryEntry {
                native: lib_acos,
                prototype: "double acos(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::atan),
                prototype: "double atan(double);",
            },
            LibraryEntry {
                native: lib_atan2,
                prototype: "double atan2(double, double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::sinh),
                prototype: "double sinh(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::cosh),
                prototype: "double cosh(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::tanh),
                prototype: "double tanh(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::exp),
                prototype: "double exp(double);",
            },
            LibraryEntry {
                native: lib_log,
                prototype: "double log(double);",
            },
            LibraryEntry {
                native: lib_log10,
                prototype: "double log10(double);",
            },
            LibraryEntry {
                native: lib_pow,
                prototype: "double pow(double, double);",
            },
            LibraryEntry {
                native: lib_sqrt,
                prototype: "double sqrt(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::abs),
                prototype: "double fabs(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::floor),
                prototype: "double floor(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::ceil),
                prototype: "double ceil(double);",
            },
            LibraryEntry {
                native: |i, p, r, a| unary(i, p, r, a, f64::round),
                prototype: "double round(double);",
            },
            LibraryEntry {
                native: lib_fmod,
                prototype: "double fmod(double, double);",
            },
        ],
        defs: Some("#define M_PI 3.141592653589793\n#define M_E 2.718281828459045\n"),
    }
}

fn unary(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
    op: fn(f64) -> f64,
) -> Result<()> {
    let value = instance.value_fp(parser, &args[0])?;
    instance.set_value_fp(parser, ret, op(value))
}

fn domain_checked(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    result: f64,
) -> Result<()> {
    if result.is_nan() {
        instance.errno.set(EDOM);
    }
    instance.set_value_fp(parser, ret, result)
}

fn lib_asin(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_fp(parser, &args[0])?;
    domain_checked(instance, parser, ret, value.asin())
}

fn lib_acos(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_fp(parser, &args[0])?;
    domain_checked(instance, parser, ret, value.acos())
}

fn lib_atan2(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let y = instance.value_fp(parser, &args[0])?;
    let x = instance.value_fp(parser, &args[1])?;
    instance.set_value_fp(parser, ret, y.atan2(x))
}

fn lib_log(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_fp(parser, &args[0])?;
    domain_checked(instance, parser, ret, value.ln())
}

fn lib_log10(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_fp(parser, &args[0])?;
    domain_checked(instance, parser, ret, value.log10())
}

fn lib_pow(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let base = instance.value_fp(parser, &args[0])?;
    let exponent = instance.value_fp(parser, &args[1])?;
    domain_checked(instance, parser, ret, base.powf(exponent))
}

fn lib_sqrt(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_fp(parser, &args[0])?;
    domain_checked(instance, parser, ret, value.sqrt())
}

fn lib_fmod(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let a = instance.value_fp(parser, &args[0])?;
    let b = instance.value_fp(parser, &args[1])?;
    instance.set_value_fp(parser, ret, if b == 0.0 { f64::NAN } else { a % b })
}
