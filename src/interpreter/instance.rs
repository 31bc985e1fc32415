//! The interpreter instance
//!
//! One [`Interpreter`] owns all state: the arena, the interner, the type
//! tree, the global and string-literal tables, the call stack, the pools of
//! function/macro definitions and token chunks, the registered library
//! bundles, and the host I/O hooks. Nothing lives in module globals;
//! multiple instances coexist without interaction.

use std::time::Instant;

use rand::rngs::StdRng;
use tracing::debug;

use crate::interpreter::errors::{InterpError, SourceLocation};
use crate::interpreter::parser::{ChunkId, ParserState, TokenChunk};
use crate::interpreter::table::{Interner, Symbol, Table};
use crate::interpreter::types::TypeTree;
use crate::interpreter::values::{FuncDef, MacroDef, PlatformCell, Value};
use crate::interpreter::variables::{
    HiddenSpan, StackFrame, VarTable, GLOBAL_TABLE_SIZE, STRING_LITERAL_TABLE_SIZE,
};
use crate::memory::Arena;
use crate::platform::library::LibraryBundle;
use crate::platform::{HostIo, StdHostIo};

/// Default arena size when the host doesn't choose one.
pub const DEFAULT_ARENA_SIZE: usize = 128 * 1024;

pub const BREAKPOINT_TABLE_SIZE: usize = 21;

/// The entire state of one interpreter.
pub struct Interpreter {
    pub arena: Arena,
    pub interner: Interner,
    pub types: TypeTree,
    pub globals: VarTable,
    pub string_literals: Table<Value>,
    pub frames: Vec<StackFrame>,
    pub functions: Vec<FuncDef>,
    pub macros: Vec<MacroDef>,
    pub chunks: Vec<TokenChunk>,
    pub(crate) libraries: Vec<LibraryBundle>,
    pub(crate) included: Vec<String>,
    pub(crate) hidden_spans: Vec<HiddenSpan>,
    pub(crate) breakpoints: Table<Vec<(u32, u32)>>,
    pub(crate) io: Box<dyn HostIo>,
    pub(crate) exit_value: i64,
    pub(crate) temp_name_counter: u32,
    pub(crate) start_instant: Instant,
    pub(crate) rng: Option<StdRng>,
    /// The host cell backing the scripted `errno`.
    pub(crate) errno: PlatformCell,
}

impl Interpreter {
    /// Construct an instance with the default stdio host hooks.
    pub fn new(arena_size: usize) -> Self {
        Self::with_io(arena_size, Box::new(StdHostIo::default()))
    }

    /// Construct an instance writing and reading through `io`.
    pub fn with_io(arena_size: usize, io: Box<dyn HostIo>) -> Self {
        let mut instance = Interpreter {
            arena: Arena::new(arena_size),
            interner: Interner::new(),
            types: TypeTree::new(),
            globals: VarTable::new(GLOBAL_TABLE_SIZE),
            string_literals: Table::new(STRING_LITERAL_TABLE_SIZE),
            frames: Vec::new(),
            functions: Vec::new(),
            macros: Vec::new(),
            chunks: Vec::new(),
            libraries: Vec::new(),
            included: Vec::new(),
            hidden_spans: Vec::new(),
            breakpoints: Table::new(BREAKPOINT_TABLE_SIZE),
            io,
            exit_value: 0,
            temp_name_counter: 0,
            start_instant: Instant::now(),
            rng: None,
            errno: PlatformCell::default(),
        };
        crate::platform::register_standard_libraries(&mut instance);
        debug!(arena_size, "interpreter initialised");
        instance
    }

    /// The value the scripted program exited with.
    pub fn exit_value(&self) -> i64 {
        self.exit_value
    }

    /// Swap in a different host I/O implementation.
    pub fn set_io(&mut self, io: Box<dyn HostIo>) {
        self.io = io;
    }

    /// Write text to the host output stream.
    pub(crate) fn write_text(&mut self, text: &str) {
        self.io.put(text);
    }

    /// Take ownership of a new token chunk, returning its handle.
    pub(crate) fn add_chunk(&mut self, chunk: TokenChunk) -> ChunkId {
        let id = ChunkId(self.chunks.len() as u32);
        self.chunks.push(chunk);
        id
    }

    /// Drop a chunk's tokens (its slot stays so handles remain stable).
    pub(crate) fn release_chunk(&mut self, id: ChunkId) {
        let chunk = &mut self.chunks[id.0 as usize];
        chunk.tokens = Vec::new();
        chunk.source = None;
    }

    /// Generated name for an anonymous struct/union/enum.
    pub(crate) fn make_temp_name(&mut self, prefix: char) -> Symbol {
        let name = format!("^{}{:04}", prefix, self.temp_name_counter);
        self.temp_name_counter += 1;
        self.interner.register(&name)
    }

    // === diagnostics ===

    /// The parser's current position as a resolved source location.
    pub(crate) fn location(&self, parser: &ParserState) -> SourceLocation {
        SourceLocation {
            file: self.interner.resolve(parser.file).to_string(),
            line: parser.line,
            column: parser.column,
        }
    }

    pub(crate) fn syntax_error(
        &self,
        parser: &ParserState,
        message: impl Into<String>,
    ) -> InterpError {
        InterpError::Syntax {
            message: message.into(),
            location: self.location(parser),
        }
    }

    pub(crate) fn type_error(
        &self,
        parser: &ParserState,
        message: impl Into<String>,
    ) -> InterpError {
        InterpError::Type {
            message: message.into(),
            location: self.location(parser),
        }
    }

    /// Teardown in reverse dependency order: frames, tables, definitions,
    /// token chunks, types, and finally the arena. The instance stays
    /// usable as a fresh (library-less) shell afterwards; dropping it does
    /// all of this implicitly.
    pub fn cleanup(&mut self) {
        debug!("interpreter teardown");
        self.frames.clear();
        self.hidden_spans.clear();
        self.breakpoints.clear();
        self.string_literals.clear();
        self.globals.live.clear();
        self.globals.shadowed.clear();
        self.macros.clear();
        self.functions.clear();
        self.libraries.clear();
        self.included.clear();
        self.chunks.clear();
        self.types = TypeTree::new();
        self.arena = Arena::new(crate::memory::ALIGN * 4);
    }
}
