//! stdlib.h shims
//!
//! Heap allocation goes straight to the arena's free-list heap, so
//! scripted `malloc`/`free` obey the same memory budget as everything
//! else. `exit` unwinds through the failure channel and is caught at the
//! host entry points.

use rand::{Rng, SeedableRng};

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::values::Value;
use crate::platform::library::{LibraryBundle, LibraryEntry};

const RAND_MAX: i64 = 0x7fff_ffff;

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "stdlib.h",
        setup: None,
        entries: vec![
            LibraryEntry {
                native: lib_malloc,
                prototype: "void *malloc(int);",
            },
            LibraryEntry {
                native: lib_calloc,
                prototype: "void *calloc(int, int);",
            },
            LibraryEntry {
                native: lib_realloc,
                prototype: "void *realloc(void *, int);",
            },
            LibraryEntry {
                native: lib_free,
                prototype: "void free(void *);",
            },
            LibraryEntry {
                native: lib_atoi,
                prototype: "int atoi(char *);",
            },
            LibraryEntry {
                native: lib_atof,
                prototype: "double atof(char *);",
            },
            LibraryEntry {
                native: lib_abs,
                prototype: "int abs(int);",
            },
            LibraryEntry {
                native: lib_rand,
                prototype: "int rand();",
            },
            LibraryEntry {
                native: lib_srand,
                prototype: "void srand(int);",
            },
            LibraryEntry {
                native: lib_exit,
                prototype: "void exit(int);",
            },
        ],
        defs: Some("#define RAND_MAX 2147483647\n"),
    }
}

fn lib_malloc(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let size = instance.value_int(parser, &args[0])?;
    if size <= 0 {
        return instance.set_value_ptr(parser, ret, 0);
    }
    let addr = instance
        .arena
        .alloc(size as usize)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    instance.set_value_ptr(parser, ret, addr)
}

fn lib_calloc(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let count = instance.value_int(parser, &args[0])?.max(0);
    let size = instance.value_int(parser, &args[1])?.max(0);
    let total = count.saturating_mul(size);
    if total <= 0 {
        return instance.set_value_ptr(parser, ret, 0);
    }
    let addr = instance
        .arena
        .alloc(total as usize)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    instance.set_value_ptr(parser, ret, addr)
}

fn lib_realloc(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let old = instance.value_ptr(parser, &args[0])?;
    let size = instance.value_int(parser, &args[1])?;
    if size <= 0 {
        if old != 0 {
            instance
                .arena
                .free(old)
                .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
        }
        return instance.set_value_ptr(parser, ret, 0);
    }
    let fresh = instance
        .arena
        .alloc(size as usize)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    if old != 0 {
        let keep = instance
            .arena
            .block_size(old)
            .unwrap_or(0)
            .min(size as usize);
        if keep > 0 {
            instance
                .arena
                .copy(fresh, old, keep)
                .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
        }
        instance
            .arena
            .free(old)
            .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    }
    instance.set_value_ptr(parser, ret, fresh)
}

fn lib_free(
    instance: &mut Interpreter,
    parser: &ParserState,
    _ret: &Value,
    args: &[Value],
) -> Result<()> {
    let addr = instance.value_ptr(parser, &args[0])?;
    if addr == 0 {
        return Ok(());
    }
    instance
        .arena
        .free(addr)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))
}

fn lib_atoi(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let text = instance.value_cstring(parser, &args[0])?;
    let trimmed = text.trim_start();
    let digits: String = trimmed
        .chars()
        .enumerate()
        .take_while(|&(index, ch)| ch.is_ascii_digit() || (index == 0 && (ch == '-' || ch == '+')))
        .map(|(_, ch)| ch)
        .collect();
    instance.set_value_int(parser, ret, digits.parse().unwrap_or(0))
}

fn lib_atof(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let text = instance.value_cstring(parser, &args[0])?;
    instance.set_value_fp(parser, ret, text.trim().parse().unwrap_or(0.0))
}

fn lib_abs(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_int(parser, &args[0])?;
    instance.set_value_int(parser, ret, value.abs())
}

fn lib_rand(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    _args: &[Value],
) -> Result<()> {
    if instance.rng.is_none() {
        // srand(1) is the C default
        instance.rng = Some(rand::rngs::StdRng::seed_from_u64(1));
    }
    let value = instance
        .rng
        .as_mut()
        .expect("seeded above")
        .gen_range(0..=RAND_MAX);
    instance.set_value_int(parser, ret, value)
}

fn lib_srand(
    instance: &mut Interpreter,
    parser: &ParserState,
    _ret: &Value,
    args: &[Value],
) -> Result<()> {
    let seed = instance.value_int(parser, &args[0])?;
    instance.rng = Some(rand::rngs::StdRng::seed_from_u64(seed as u64));
    Ok(())
}

fn lib_exit(
    instance: &mut Interpreter,
    parser: &ParserState,
    _ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_int(parser, &args[0])?;
    Err(InterpError::Exit { value })
}
