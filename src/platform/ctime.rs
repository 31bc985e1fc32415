//! time.h shims
//!
//! `time` reads the host wall clock; `clock` measures host CPU-ish time as
//! microseconds since the instance was constructed, with `CLOCKS_PER_SEC`
//! bound as a platform variable to match.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::values::{PlatformCell, Value};
use crate::platform::library::{LibraryBundle, LibraryEntry};

const CLOCKS_PER_SEC: i64 = 1_000_000;

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "time.h",
        setup: Some(setup),
        entries: vec![
            LibraryEntry {
                native: lib_time,
                prototype: "int time(int *);",
            },
            LibraryEntry {
                native: lib_clock,
                prototype: "int clock();",
            },
            LibraryEntry {
                native: lib_difftime,
                prototype: "double difftime(int, int);",
            },
        ],
        defs: Some("typedef int time_t;\ntypedef int clock_t;\n"),
    }
}

fn setup(instance: &mut Interpreter) -> Result<()> {
    let cell = PlatformCell::default();
    cell.set(CLOCKS_PER_SEC);
    let int_type = instance.types.int_type;
    instance.define_platform_var("CLOCKS_PER_SEC", int_type, cell, false)
}

fn lib_time(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0);
    let out = instance.value_ptr(parser, &args[0])?;
    if out != 0 {
        instance
            .arena
            .store_int(out, crate::interpreter::types::INT_SIZE, now)
            .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    }
    instance.set_value_int(parser, ret, now)
}

fn lib_clock(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    _args: &[Value],
) -> Result<()> {
    let elapsed = instance.start_instant.elapsed().as_micros() as i64;
    instance.set_value_int(parser, ret, elapsed)
}

fn lib_difftime(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let end = instance.value_int(parser, &args[0])?;
    let start = instance.value_int(parser, &args[1])?;
    instance.set_value_fp(parser, ret, (end - start) as f64)
}
