//! # minic
//!
//! minic parses and executes a subset of C in a single pass: statements
//! take effect as their tokens are consumed, with no syntax tree in
//! between. It is built to embed — the host constructs an
//! [`interpreter::Interpreter`], registers library bundles of intrinsic
//! functions and platform variables, and feeds it source text or an
//! interactive prompt — and to run in a bounded memory budget: all
//! script-visible state lives in one arena combining a lexical stack and
//! a free-list heap.
//!
//! ## Execution pipeline
//!
//! ```text
//! Source → Lexer → Tokens → Parse-Execute (types, values, scopes) → Output
//! ```
//!
//! 1. [`lexer`] — tokenises the source, interning identifiers.
//! 2. [`interpreter`] — the nucleus: type tree, value model, variable
//!    scopes, stack frames, and the run-mode driven parse-execute core.
//! 3. [`memory`] — the dual stack/heap arena with checked pointer decode.
//! 4. [`platform`] — host I/O, entry points, and the C library shims
//!    (stdio, string, stdlib, math, time, errno, ctype, stdbool, unistd).
//!
//! ## Supported C subset
//!
//! Types: the integer family, `double`, `char`, pointers, fixed and
//! initializer-sized arrays, structs, unions, enums, typedefs.
//! Control flow: `if/else`, `while`, `do-while`, `for`, `switch/case`,
//! `break`, `continue`, `goto`, function calls and recursion.
//! Preprocessor: `#define` (with and without parameters), `#include` of
//! registered headers, `#if`/`#ifdef`/`#ifndef`/`#else`/`#endif`.

pub mod interpreter;
pub mod lexer;
pub mod memory;
pub mod platform;

pub use interpreter::{InterpError, Interpreter, SourceLocation};
pub use platform::{CaptureIo, HostIo, StdHostIo};
