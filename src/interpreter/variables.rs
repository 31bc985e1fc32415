//! Variable definition, lookup, scopes, and stack frames
//!
//! Variables bind interned identifiers to [`Value`]s in the global table
//! or the top stack frame's local table. Lexical blocks don't delete their
//! variables on exit: each block gets a deterministic [`ScopeId`], and
//! leaving the block *hides* its variables (moving them to the table's
//! shadowed list and remembering their payload spans), so that re-entering
//! the same block — a loop body, a re-called function — *revives* them with
//! their payload intact. Static locals live in the global table under a
//! mangled `/file/function/name` key with a short-name alias sharing the
//! same payload, which is what makes their payload address stable across
//! calls.

use std::hash::Hasher;

use rustc_hash::FxHasher;
use tracing::trace;

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::table::{DeclSite, Symbol, Table};
use crate::interpreter::types::TypeId;
use crate::interpreter::values::{PlatformCell, ValSlot, Value};
use crate::memory::{align_up, Address};

pub const GLOBAL_TABLE_SIZE: usize = 97;
pub const STRING_LITERAL_TABLE_SIZE: usize = 97;
pub const LOCAL_TABLE_SIZE: usize = 11;

/// Deterministic identifier for a lexical block. The same block re-entered
/// during re-execution hashes to the same id, which is what revival keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(pub i64);

impl ScopeId {
    /// Globals and intrinsic-registered names; never hidden.
    pub const GLOBAL: ScopeId = ScopeId(-1);
}

/// A table entry moved out of the live index by scope exit.
#[derive(Debug, Clone)]
pub struct ShadowedEntry {
    pub key: Symbol,
    pub decl: DeclSite,
    pub value: Value,
}

/// A variable table with its shadowed companion list.
#[derive(Debug)]
pub struct VarTable {
    pub live: Table<Value>,
    pub shadowed: Vec<ShadowedEntry>,
}

impl VarTable {
    pub fn new(buckets: usize) -> Self {
        VarTable {
            live: Table::new(buckets),
            shadowed: Vec::new(),
        }
    }
}

/// Stack-payload range belonging to a hidden variable; dereferencing a
/// pointer into one of these reports "out of scope" instead of reading
/// stale bytes.
#[derive(Debug, Clone, Copy)]
pub struct HiddenSpan {
    pub addr: Address,
    pub size: usize,
    pub scope: ScopeId,
}

/// A function call's activation record. The arena mirrors it with an
/// in-stack frame link so popping the frame rewinds every local payload.
#[derive(Debug)]
pub struct StackFrame {
    pub return_parser: ParserState,
    pub func_name: Symbol,
    pub return_slot: Value,
    pub params: Vec<Value>,
    pub locals: VarTable,
}

impl Interpreter {
    /// Find a variable: top frame's locals first, then globals. Hidden
    /// entries are invisible here.
    pub(crate) fn variable_lookup(&self, ident: Symbol) -> Option<Value> {
        if let Some(frame) = self.frames.last() {
            if let Some(entry) = frame.locals.live.get(ident) {
                return Some(entry.value.clone());
            }
        }
        self.globals.live.get(ident).map(|entry| entry.value.clone())
    }

    /// Whether `ident` exists only as a hidden (out-of-scope) binding.
    pub(crate) fn variable_defined_and_out_of_scope(&self, ident: Symbol) -> bool {
        let shadowed = match self.frames.last() {
            Some(frame) => &frame.locals.shadowed,
            None => &self.globals.shadowed,
        };
        shadowed.iter().any(|entry| entry.key == ident)
    }

    /// Get a variable, with the undefined/out-of-scope distinction.
    pub(crate) fn variable_get(&self, parser: &ParserState, ident: Symbol) -> Result<Value> {
        if let Some(value) = self.variable_lookup(ident) {
            return Ok(value);
        }
        let name = self.interner.resolve(ident).to_string();
        if self.variable_defined_and_out_of_scope(ident) {
            Err(InterpError::OutOfScope {
                name,
                location: self.location(parser),
            })
        } else {
            Err(InterpError::Undefined {
                name,
                location: self.location(parser),
            })
        }
    }

    /// Bind a value in the current table; duplicate keys are a name error.
    pub(crate) fn variable_bind(
        &mut self,
        parser: &ParserState,
        ident: Symbol,
        value: Value,
    ) -> Result<Value> {
        let decl = DeclSite {
            file: parser.file,
            line: parser.line,
            column: parser.column,
        };
        let result = value.clone();
        let table = match self.frames.last_mut() {
            Some(frame) => &mut frame.locals,
            None => &mut self.globals,
        };
        if !table.live.set(ident, value, decl) {
            return Err(InterpError::AlreadyDefined {
                name: self.interner.resolve(ident).to_string(),
                location: self.location(parser),
            });
        }
        Ok(result)
    }

    /// Define a new variable from an initial value (deep copied) or a type
    /// (fresh zeroed payload). Globals go on the heap, locals on the stack.
    pub(crate) fn variable_define(
        &mut self,
        parser: &ParserState,
        ident: Symbol,
        init: Option<&Value>,
        typ: Option<TypeId>,
        writable: bool,
    ) -> Result<Value> {
        let on_heap = self.frames.is_empty();
        let mut value = match init {
            Some(init) => self.alloc_value_copy(parser, init, on_heap)?,
            None => {
                let typ = typ.expect("define without an initial value needs a type");
                self.alloc_value_from_type(parser, typ, writable, on_heap)?
            }
        };
        value.is_lvalue = writable;
        value.scope_id = parser.scope_id;
        value.out_of_scope = false;
        self.variable_bind(parser, ident, value)
    }

    /// Define a variable unless this exact declaration already ran.
    ///
    /// Statics are installed in the global table under a mangled
    /// `/file/function/name`; the returned flag is true on the first visit
    /// so initializers run once. Non-statics re-encountered at the exact
    /// same declaration site (loop bodies, re-called functions) return the
    /// existing value instead of raising a redefinition error.
    pub(crate) fn variable_define_but_ignore_identical(
        &mut self,
        parser: &ParserState,
        ident: Symbol,
        typ: TypeId,
        is_static: bool,
    ) -> Result<(Value, bool)> {
        if self.types.is_forward_declared(typ) {
            let display = self.types.display(typ, &self.interner);
            return Err(self.type_error(parser, format!("type '{}' isn't defined", display)));
        }

        let table = match self.frames.last() {
            Some(frame) => &frame.locals,
            None => &self.globals,
        };
        if let Some(entry) = table.live.get(ident) {
            let same_site = parser.line != 0
                && entry.decl.file == parser.file
                && entry.decl.line == parser.line
                && entry.decl.column == parser.column;
            if same_site {
                return Ok((entry.value.clone(), false));
            }
        }

        if is_static {
            let mangled = {
                let file = self.interner.resolve(parser.file);
                let ident_text = self.interner.resolve(ident);
                match self.frames.last() {
                    Some(frame) => format!(
                        "/{}/{}/{}",
                        file,
                        self.interner.resolve(frame.func_name),
                        ident_text
                    ),
                    None => format!("/{}/{}", file, ident_text),
                }
            };
            let mangled = self.interner.register(&mangled);

            let (global, first_visit) = match self.globals.live.get(mangled) {
                Some(entry) => (entry.value.clone(), false),
                None => {
                    let fresh = self.alloc_value_from_type(parser, typ, true, true)?;
                    let decl = DeclSite {
                        file: parser.file,
                        line: parser.line,
                        column: parser.column,
                    };
                    self.globals.live.set(mangled, fresh.clone(), decl);
                    (fresh, true)
                }
            };

            // short-name alias in the current scope, sharing the payload
            let mut alias = global.clone();
            alias.scope_id = parser.scope_id;
            self.variable_bind(parser, ident, alias)?;
            Ok((global, first_visit))
        } else {
            let value = self.variable_define(parser, ident, None, Some(typ), true)?;
            Ok((value, true))
        }
    }

    /// Bind a name whose payload is a host-supplied cell, so scripted reads
    /// and writes alias host state directly.
    pub(crate) fn define_platform_var(
        &mut self,
        name: &str,
        typ: TypeId,
        cell: PlatformCell,
        writable: bool,
    ) -> Result<()> {
        let ident = self.interner.register(name);
        let value = Value::new(typ, ValSlot::Cell(cell), writable, ScopeId::GLOBAL);
        let table = match self.frames.last_mut() {
            Some(frame) => &mut frame.locals,
            None => &mut self.globals,
        };
        if !table.live.set(ident, value, DeclSite::NONE) {
            return Err(InterpError::AlreadyDefined {
                name: name.to_string(),
                location: Default::default(),
            });
        }
        Ok(())
    }

    // === scopes ===

    fn scope_hash(chunk: u32, cursor: usize) -> ScopeId {
        let mut hasher = FxHasher::default();
        hasher.write_u32(chunk);
        hasher.write_usize(cursor);
        let id = hasher.finish() as i64;
        // -1 is reserved for globals
        ScopeId(if id == -1 { -2 } else { id })
    }

    /// Enter a lexical block: compute its deterministic id, remember the
    /// previous one, and revive any hidden variables belonging to it.
    pub(crate) fn scope_begin(&mut self, parser: &mut ParserState) -> (ScopeId, ScopeId) {
        let old = parser.scope_id;
        let new = Self::scope_hash(parser.chunk.0, parser.cursor);
        parser.scope_id = new;

        let table = match self.frames.last_mut() {
            Some(frame) => &mut frame.locals,
            None => &mut self.globals,
        };
        let mut index = 0;
        while index < table.shadowed.len() {
            if table.shadowed[index].value.scope_id == new {
                let mut entry = table.shadowed.swap_remove(index);
                trace!(scope = new.0, "reviving hidden variable");
                entry.value.out_of_scope = false;
                table.live.set(entry.key, entry.value, entry.decl);
            } else {
                index += 1;
            }
        }
        self.hidden_spans.retain(|span| span.scope != new);

        (new, old)
    }

    /// Leave a lexical block: hide every live variable carrying its id and
    /// restore the previous id.
    pub(crate) fn scope_end(&mut self, parser: &mut ParserState, scope: ScopeId, prev: ScopeId) {
        let mut spans = Vec::new();
        {
            let table = match self.frames.last_mut() {
                Some(frame) => &mut frame.locals,
                None => &mut self.globals,
            };
            let dying: Vec<Symbol> = table
                .live
                .iter()
                .filter(|entry| entry.value.scope_id == scope && !entry.value.out_of_scope)
                .map(|entry| entry.key)
                .collect();
            for key in dying {
                let decl = table.live.get(key).map(|entry| entry.decl).unwrap_or(DeclSite::NONE);
                if let Some(mut value) = table.live.delete(key) {
                    value.out_of_scope = true;
                    if let Some(addr) = value.address() {
                        spans.push((addr, value.typ));
                    }
                    table.shadowed.push(ShadowedEntry { key, decl, value });
                }
            }
        }
        for (addr, typ) in spans {
            self.hidden_spans.push(HiddenSpan {
                addr,
                size: align_up(self.types.sizeof(typ, false)),
                scope,
            });
        }
        parser.scope_id = prev;
    }

    /// Dereference guard: reading through a pointer into a hidden block's
    /// payload is an out-of-scope access, not a plain invalid pointer.
    pub(crate) fn check_not_hidden(&self, parser: &ParserState, addr: Address) -> Result<()> {
        for span in &self.hidden_spans {
            if addr >= span.addr && addr < span.addr + span.size as Address {
                return Err(InterpError::OutOfScopeAccess {
                    addr,
                    location: self.location(parser),
                });
            }
        }
        Ok(())
    }

    // === stack frames ===

    /// Push a call frame: the arena gets its frame link, the instance gets
    /// the activation record. The return slot is allocated by the caller,
    /// in the caller's frame, so it survives the pop.
    pub(crate) fn stack_frame_add(
        &mut self,
        parser: &ParserState,
        func_name: Symbol,
        return_slot: Value,
    ) -> Result<()> {
        self.arena
            .push_frame()
            .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
        self.frames.push(StackFrame {
            return_parser: parser.clone(),
            func_name,
            return_slot,
            params: Vec::new(),
            locals: VarTable::new(LOCAL_TABLE_SIZE),
        });
        Ok(())
    }

    /// Pop the top frame, restoring the caller's parser state and
    /// releasing every payload the frame pushed.
    pub(crate) fn stack_frame_pop(&mut self, parser: &mut ParserState) -> Result<()> {
        let frame = self.frames.pop().ok_or_else(|| InterpError::StackUnderrun {
            location: self.location(parser),
        })?;
        *parser = frame.return_parser;
        self.arena
            .pop_frame()
            .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
        // stack spans inside the released region would alias future pushes
        let top = self.arena.stack_top();
        let arena = &self.arena;
        self.hidden_spans
            .retain(|span| span.addr < top || arena.region(span.addr) == crate::memory::Region::Heap);
        Ok(())
    }

    // === string literals ===

    /// The shared value for a string literal: one heap char array per
    /// distinct contents, NUL terminated.
    pub(crate) fn string_literal_value(
        &mut self,
        parser: &ParserState,
        contents: Symbol,
    ) -> Result<Value> {
        if let Some(entry) = self.string_literals.get(contents) {
            return Ok(entry.value.clone());
        }
        let text = self.interner.resolve(contents).to_string();
        let bytes = text.as_bytes();
        let array_type = self.types.array_of(self.types.char_type, bytes.len() + 1);
        let addr = self
            .arena
            .alloc(bytes.len() + 1)
            .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
        self.arena
            .write_bytes(addr, bytes)
            .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
        let value = Value::new(array_type, ValSlot::Arena(addr), false, ScopeId::GLOBAL);
        self.string_literals.set(contents, value.clone(), DeclSite::NONE);
        Ok(value)
    }
}
