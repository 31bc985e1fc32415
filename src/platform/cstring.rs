//! string.h shims
//!
//! All of these operate on raw bytes in the arena through checked reads
//! and writes, so a runaway copy fails with a pointer error instead of
//! stomping unrelated storage.

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::values::Value;
use crate::memory::Address;
use crate::platform::library::{LibraryBundle, LibraryEntry};

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "string.h",
        setup: None,
        entries: vec![
            LibraryEntry {
                native: lib_strlen,
                prototype: "int strlen(char *);",
            },
            LibraryEntry {
                native: lib_strcpy,
                prototype: "char *strcpy(char *, char *);",
            },
            LibraryEntry {
                native: lib_strncpy,
                prototype: "char *strncpy(char *, char *, int);",
            },
            LibraryEntry {
                native: lib_strcmp,
                prototype: "int strcmp(char *, char *);",
            },
            LibraryEntry {
                native: lib_strncmp,
                prototype: "int strncmp(char *, char *, int);",
            },
            LibraryEntry {
                native: lib_strcat,
                prototype: "char *strcat(char *, char *);",
            },
            LibraryEntry {
                native: lib_strchr,
                prototype: "char *strchr(char *, int);",
            },
            LibraryEntry {
                native: lib_strrchr,
                prototype: "char *strrchr(char *, int);",
            },
            LibraryEntry {
                native: lib_memset,
                prototype: "void *memset(void *, int, int);",
            },
            LibraryEntry {
                native: lib_memcpy,
                prototype: "void *memcpy(void *, void *, int);",
            },
            LibraryEntry {
                native: lib_memmove,
                prototype: "void *memmove(void *, void *, int);",
            },
            LibraryEntry {
                native: lib_memcmp,
                prototype: "int memcmp(void *, void *, int);",
            },
        ],
        defs: None,
    }
}

fn cstring_at(instance: &Interpreter, parser: &ParserState, addr: Address) -> Result<Vec<u8>> {
    instance
        .arena
        .read_cstring(addr)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))
}

fn lib_strlen(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let addr = instance.value_ptr(parser, &args[0])?;
    let bytes = cstring_at(instance, parser, addr)?;
    instance.set_value_int(parser, ret, bytes.len() as i64)
}

fn lib_strcpy(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let dest = instance.value_ptr(parser, &args[0])?;
    let src = instance.value_ptr(parser, &args[1])?;
    let mut bytes = cstring_at(instance, parser, src)?;
    bytes.push(0);
    instance
        .arena
        .write_bytes(dest, &bytes)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    instance.set_value_ptr(parser, ret, dest)
}

fn lib_strncpy(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let dest = instance.value_ptr(parser, &args[0])?;
    let src = instance.value_ptr(parser, &args[1])?;
    let limit = instance.value_int(parser, &args[2])?.max(0) as usize;
    let mut bytes = cstring_at(instance, parser, src)?;
    bytes.truncate(limit);
    // C pads with NULs out to the limit
    while bytes.len() < limit {
        bytes.push(0);
    }
    instance
        .arena
        .write_bytes(dest, &bytes)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    instance.set_value_ptr(parser, ret, dest)
}

fn lib_strcmp(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let a = cstring_at(instance, parser, instance.value_ptr(parser, &args[0])?)?;
    let b = cstring_at(instance, parser, instance.value_ptr(parser, &args[1])?)?;
    let order = match a.cmp(&b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    instance.set_value_int(parser, ret, order)
}

fn lib_strncmp(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let limit = instance.value_int(parser, &args[2])?.max(0) as usize;
    let mut a = cstring_at(instance, parser, instance.value_ptr(parser, &args[0])?)?;
    let mut b = cstring_at(instance, parser, instance.value_ptr(parser, &args[1])?)?;
    a.truncate(limit);
    b.truncate(limit);
    let order = match a.cmp(&b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    instance.set_value_int(parser, ret, order)
}

fn lib_strcat(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let dest = instance.value_ptr(parser, &args[0])?;
    let src = instance.value_ptr(parser, &args[1])?;
    let existing = cstring_at(instance, parser, dest)?;
    let mut bytes = cstring_at(instance, parser, src)?;
    bytes.push(0);
    instance
        .arena
        .write_bytes(dest + existing.len() as Address, &bytes)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    instance.set_value_ptr(parser, ret, dest)
}

fn lib_strchr(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let haystack = instance.value_ptr(parser, &args[0])?;
    let needle = instance.value_int(parser, &args[1])? as u8;
    let bytes = cstring_at(instance, parser, haystack)?;
    match bytes.iter().position(|&byte| byte == needle) {
        Some(offset) => instance.set_value_ptr(parser, ret, haystack + offset as Address),
        None => instance.set_value_ptr(parser, ret, 0),
    }
}

fn lib_strrchr(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let haystack = instance.value_ptr(parser, &args[0])?;
    let needle = instance.value_int(parser, &args[1])? as u8;
    let bytes = cstring_at(instance, parser, haystack)?;
    match bytes.iter().rposition(|&byte| byte == needle) {
        Some(offset) => instance.set_value_ptr(parser, ret, haystack + offset as Address),
        None => instance.set_value_ptr(parser, ret, 0),
    }
}

fn lib_memset(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let dest = instance.value_ptr(parser, &args[0])?;
    let fill = instance.value_int(parser, &args[1])? as u8;
    let count = instance.value_int(parser, &args[2])?.max(0) as usize;
    instance
        .arena
        .write_bytes(dest, &vec![fill; count])
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    instance.set_value_ptr(parser, ret, dest)
}

fn lib_memcpy(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let dest = instance.value_ptr(parser, &args[0])?;
    let src = instance.value_ptr(parser, &args[1])?;
    let count = instance.value_int(parser, &args[2])?.max(0) as usize;
    instance
        .arena
        .copy(dest, src, count)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    instance.set_value_ptr(parser, ret, dest)
}

fn lib_memmove(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    // the arena copy buffers, so overlap is already safe
    lib_memcpy(instance, parser, ret, args)
}

fn lib_memcmp(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let a = instance.value_ptr(parser, &args[0])?;
    let b = instance.value_ptr(parser, &args[1])?;
    let count = instance.value_int(parser, &args[2])?.max(0) as usize;
    let left = instance
        .arena
        .read_bytes(a, count)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?
        .to_vec();
    let right = instance
        .arena
        .read_bytes(b, count)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    let order = match left.as_slice().cmp(right) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    instance.set_value_int(parser, ret, order)
}
