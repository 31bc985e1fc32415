//! unistd.h shims: the small portable subset.

use crate::interpreter::errors::Result;
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::values::Value;
use crate::platform::library::{LibraryBundle, LibraryEntry};

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "unistd.h",
        setup: None,
        entries: vec![
            LibraryEntry {
                native: lib_getpid,
                prototype: "int getpid();",
            },
            LibraryEntry {
                native: lib_sleep,
                prototype: "int sleep(int);",
            },
            LibraryEntry {
                native: lib_usleep,
                prototype: "int usleep(int);",
            },
        ],
        defs: None,
    }
}

fn lib_getpid(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    _args: &[Value],
) -> Result<()> {
    instance.set_value_int(parser, ret, std::process::id() as i64)
}

fn lib_sleep(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let seconds = instance.value_int(parser, &args[0])?.max(0);
    std::thread::sleep(std::time::Duration::from_secs(seconds as u64));
    instance.set_value_int(parser, ret, 0)
}

fn lib_usleep(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let micros = instance.value_int(parser, &args[0])?.max(0);
    std::thread::sleep(std::time::Duration::from_micros(micros as u64));
    instance.set_value_int(parser, ret, 0)
}
