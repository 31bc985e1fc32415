//! stdbool.h shims: a typedef and two macros, no native code.

use crate::platform::library::LibraryBundle;

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "stdbool.h",
        setup: None,
        entries: Vec::new(),
        defs: Some("typedef int bool;\n#define true 1\n#define false 0\n"),
    }
}
