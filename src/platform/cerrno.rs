//! errno.h shims
//!
//! `errno` itself is the canonical platform variable: its payload is a
//! host-owned cell shared between the instance, the intrinsics that set
//! it, and any embedding code holding the same handle. The error constants
//! are bound read-only.

use crate::interpreter::errors::Result;
use crate::interpreter::instance::Interpreter;
use crate::interpreter::values::PlatformCell;
use crate::platform::library::LibraryBundle;

pub const EDOM: i64 = 33;
pub const ERANGE: i64 = 34;

const CONSTANTS: &[(&str, i64)] = &[
    ("EPERM", 1),
    ("ENOENT", 2),
    ("EINTR", 4),
    ("EIO", 5),
    ("EBADF", 9),
    ("EAGAIN", 11),
    ("ENOMEM", 12),
    ("EACCES", 13),
    ("EEXIST", 17),
    ("EINVAL", 22),
    ("ENOSPC", 28),
    ("EDOM", EDOM),
    ("ERANGE", ERANGE),
];

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "errno.h",
        setup: Some(setup),
        entries: Vec::new(),
        defs: None,
    }
}

fn setup(instance: &mut Interpreter) -> Result<()> {
    let int_type = instance.types.int_type;
    let errno = instance.errno.clone();
    instance.define_platform_var("errno", int_type, errno, true)?;
    for &(name, value) in CONSTANTS {
        let cell = PlatformCell::default();
        cell.set(value);
        instance.define_platform_var(name, int_type, cell, false)?;
    }
    Ok(())
}
