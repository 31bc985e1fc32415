//! Runtime value representation and allocation
//!
//! A [`Value`] is a small header: its type, where its payload lives, and
//! its lvalue/scope flags. Scalar and aggregate payloads are bytes in the
//! arena (stack for locals and temporaries, heap for globals and anything
//! that outlives a frame); function, macro, and typedef payloads are
//! handles into side pools; platform variables alias a host-owned cell.
//!
//! The allocators cover the four lifecycles the engine needs: fresh value
//! from a type (stack or heap), deep copy of an existing value, a view
//! sharing an existing payload, and payload reallocation for values that
//! change size (unsized arrays receiving their initializer).

use std::cell::Cell;
use std::rc::Rc;

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::{ChunkId, ParserState};
use crate::interpreter::table::Symbol;
use crate::interpreter::types::{BaseType, TypeId, INT_SIZE};
use crate::interpreter::variables::ScopeId;
use crate::memory::{Address, Region};
use crate::platform::library::NativeFn;

/// Handle into the instance's function-definition pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncId(pub u32);

/// Handle into the instance's macro-definition pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroId(pub u32);

/// A host-owned integer cell shared with the script (e.g. `errno`).
pub type PlatformCell = Rc<Cell<i64>>;

/// Where a value's payload lives.
#[derive(Debug, Clone)]
pub enum ValSlot {
    /// Payload bytes in the arena; the address region tells the storage
    /// class (stack vs heap).
    Arena(Address),
    Func(FuncId),
    Mac(MacroId),
    /// A typedef: a value whose payload is a type.
    Ty(TypeId),
    /// Payload aliases host memory.
    Cell(PlatformCell),
}

/// A runtime value header. Cheap to clone; the payload is not duplicated.
#[derive(Debug, Clone)]
pub struct Value {
    pub typ: TypeId,
    pub slot: ValSlot,
    pub is_lvalue: bool,
    pub scope_id: ScopeId,
    pub out_of_scope: bool,
}

impl Value {
    pub fn new(typ: TypeId, slot: ValSlot, is_lvalue: bool, scope_id: ScopeId) -> Self {
        Value {
            typ,
            slot,
            is_lvalue,
            scope_id,
            out_of_scope: false,
        }
    }

    /// The arena address of the payload, when it has one.
    pub fn address(&self) -> Option<Address> {
        match self.slot {
            ValSlot::Arena(addr) => Some(addr),
            _ => None,
        }
    }
}

/// How a function runs: native host code or a scripted token body.
#[derive(Clone)]
pub enum FuncBody {
    Intrinsic(NativeFn),
    Tokens(ChunkId),
    /// Prototype seen, body (or intrinsic patch) still pending.
    Forward,
}

impl std::fmt::Debug for FuncBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FuncBody::Intrinsic(_) => f.write_str("Intrinsic"),
            FuncBody::Tokens(chunk) => write!(f, "Tokens({:?})", chunk),
            FuncBody::Forward => f.write_str("Forward"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub ret_type: TypeId,
    pub params: Vec<(Symbol, TypeId)>,
    pub varargs: bool,
    pub body: FuncBody,
}

#[derive(Debug, Clone)]
pub struct MacroDef {
    /// `None` for object-like macros, parameter names otherwise.
    pub params: Option<Vec<Symbol>>,
    pub body: ChunkId,
}

/// An evaluated scalar, after promotion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Fp(f64),
    Ptr(Address),
}

impl Scalar {
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::UInt(v) => v as i64,
            Scalar::Fp(v) => v as i64,
            Scalar::Ptr(v) => v as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Scalar::Int(v) => v as u64,
            Scalar::UInt(v) => v,
            Scalar::Fp(v) => v as u64,
            Scalar::Ptr(v) => v,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::UInt(v) => v as f64,
            Scalar::Fp(v) => v,
            Scalar::Ptr(v) => v as f64,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Scalar::Int(v) => v == 0,
            Scalar::UInt(v) => v == 0,
            Scalar::Fp(v) => v == 0.0,
            Scalar::Ptr(v) => v == 0,
        }
    }
}

impl Interpreter {
    /// Allocate a fresh value of `typ`, payload zeroed, on the stack or
    /// heap.
    pub(crate) fn alloc_value_from_type(
        &mut self,
        parser: &ParserState,
        typ: TypeId,
        is_lvalue: bool,
        on_heap: bool,
    ) -> Result<Value> {
        let size = self.types.sizeof(typ, false);
        let addr = if on_heap {
            self.arena.alloc(size)
        } else {
            self.arena.push(size)
        }
        .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
        Ok(Value::new(
            typ,
            ValSlot::Arena(addr),
            is_lvalue,
            parser.scope_id,
        ))
    }

    /// Allocate a deep copy of `from` (payload bytes duplicated).
    pub(crate) fn alloc_value_copy(
        &mut self,
        parser: &ParserState,
        from: &Value,
        on_heap: bool,
    ) -> Result<Value> {
        match &from.slot {
            ValSlot::Arena(src) => {
                let src = *src;
                let copy_size = self.types.sizeof(from.typ, true);
                let fresh = self.alloc_value_from_type(parser, from.typ, from.is_lvalue, on_heap)?;
                if copy_size > 0 {
                    let dst = fresh.address().expect("fresh arena value has an address");
                    self.arena
                        .copy(dst, src, copy_size)
                        .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
                }
                Ok(fresh)
            }
            ValSlot::Cell(cell) => {
                let current = cell.get();
                let fresh = self.alloc_value_from_type(parser, from.typ, from.is_lvalue, on_heap)?;
                let addr = fresh.address().expect("fresh arena value has an address");
                let size = self.types.sizeof(from.typ, true);
                self.arena
                    .store_int(addr, size.min(8), current)
                    .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
                Ok(fresh)
            }
            // function, macro, and type payloads are immutable handles
            _ => Ok(from.clone()),
        }
    }

    /// A non-writable heap int, for enum constants and similar.
    pub(crate) fn alloc_int_constant(&mut self, parser: &ParserState, value: i64) -> Result<Value> {
        let constant =
            self.alloc_value_from_type(parser, self.types.int_type, false, true)?;
        let addr = constant.address().expect("int constant lives in the arena");
        self.arena
            .store_int(addr, INT_SIZE, value)
            .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
        Ok(constant)
    }

    /// Move a value's payload to a freshly allocated heap block of
    /// `new_size` bytes, freeing the previous payload when it was
    /// heap-owned.
    pub(crate) fn value_realloc(
        &mut self,
        parser: &ParserState,
        value: &mut Value,
        new_size: usize,
    ) -> Result<()> {
        let old_addr = value.address();
        let fresh = self
            .arena
            .alloc(new_size)
            .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
        if let Some(old) = old_addr {
            let old_size = self.types.sizeof(value.typ, true);
            let keep = old_size.min(new_size);
            if keep > 0 {
                self.arena
                    .copy(fresh, old, keep)
                    .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
            }
            if self.arena.region(old) == Region::Heap && self.arena.block_size(old).is_some() {
                let _ = self.arena.free(old);
            }
        }
        value.slot = ValSlot::Arena(fresh);
        Ok(())
    }

    /// Stack bytes a value owns, for balanced popping of temporaries.
    pub(crate) fn value_stack_size(&self, value: &Value) -> usize {
        match value.slot {
            ValSlot::Arena(addr) if self.arena.region(addr) == Region::Stack => {
                crate::memory::align_up(self.types.sizeof(value.typ, false))
            }
            _ => 0,
        }
    }

    // === scalar load/store ===

    /// Load the scalar stored at `addr`, interpreted as `typ`.
    pub(crate) fn load_scalar(
        &self,
        parser: &ParserState,
        typ: TypeId,
        addr: Address,
    ) -> Result<Scalar> {
        self.check_not_hidden(parser, addr)?;
        let node = self.types.node(typ);
        let result = match node.base {
            base if base.is_integer() || base == BaseType::Enum => {
                let size = if base == BaseType::Enum {
                    INT_SIZE
                } else {
                    node.sizeof
                };
                let raw = self.arena.load_int(addr, size, base.is_signed() || base == BaseType::Enum);
                match raw {
                    Ok(value) if base.is_signed() || base == BaseType::Enum => {
                        Ok(Scalar::Int(value))
                    }
                    Ok(value) => Ok(Scalar::UInt(value as u64)),
                    Err(error) => Err(error),
                }
            }
            BaseType::Fp => self.arena.load_f64(addr).map(Scalar::Fp),
            BaseType::Pointer => self.arena.read_u64(addr).map(Scalar::Ptr),
            _ => {
                let display = self.types.display(typ, &self.interner);
                return Err(self.type_error(parser, format!("'{}' is not a scalar type", display)));
            }
        };
        result.map_err(|error| InterpError::from_arena(error, self.location(parser)))
    }

    /// Store a scalar at `addr`, converted to the representation of `typ`.
    pub(crate) fn store_scalar(
        &mut self,
        parser: &ParserState,
        typ: TypeId,
        addr: Address,
        scalar: Scalar,
    ) -> Result<()> {
        self.check_not_hidden(parser, addr)?;
        let node = self.types.node(typ);
        let result = match node.base {
            base if base.is_integer() => self.arena.store_int(addr, node.sizeof, scalar.as_i64()),
            BaseType::Enum => self.arena.store_int(
                addr,
                INT_SIZE,
                scalar.as_i64(),
            ),
            BaseType::Fp => self.arena.store_f64(addr, scalar.as_f64()),
            BaseType::Pointer => self.arena.write_u64(addr, scalar.as_u64()),
            _ => {
                let display = self.types.display(typ, &self.interner);
                return Err(self.type_error(parser, format!("'{}' is not a scalar type", display)));
            }
        };
        result.map_err(|error| InterpError::from_arena(error, self.location(parser)))
    }

    // === intrinsic-facing accessors ===

    /// Read a value's payload as an integer.
    pub(crate) fn value_int(&self, parser: &ParserState, value: &Value) -> Result<i64> {
        match &value.slot {
            ValSlot::Arena(addr) => Ok(self.load_scalar(parser, value.typ, *addr)?.as_i64()),
            ValSlot::Cell(cell) => Ok(cell.get()),
            _ => Err(self.type_error(parser, "expected a numeric value")),
        }
    }

    /// Read a value's payload as a floating-point number.
    pub(crate) fn value_fp(&self, parser: &ParserState, value: &Value) -> Result<f64> {
        match &value.slot {
            ValSlot::Arena(addr) => Ok(self.load_scalar(parser, value.typ, *addr)?.as_f64()),
            ValSlot::Cell(cell) => Ok(cell.get() as f64),
            _ => Err(self.type_error(parser, "expected a numeric value")),
        }
    }

    /// Read a value's payload as a pointer address.
    pub(crate) fn value_ptr(&self, parser: &ParserState, value: &Value) -> Result<Address> {
        match &value.slot {
            ValSlot::Arena(addr) => match self.load_scalar(parser, value.typ, *addr)? {
                Scalar::Ptr(target) => Ok(target),
                other => Ok(other.as_u64()),
            },
            _ => Err(self.type_error(parser, "expected a pointer value")),
        }
    }

    /// Read the NUL-terminated string a char-pointer value points at.
    pub(crate) fn value_cstring(&self, parser: &ParserState, value: &Value) -> Result<String> {
        let target = self.value_ptr(parser, value)?;
        let bytes = self
            .arena
            .read_cstring(target)
            .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Write an integer into a value's payload (return slots, out-params).
    pub(crate) fn set_value_int(
        &mut self,
        parser: &ParserState,
        value: &Value,
        result: i64,
    ) -> Result<()> {
        match &value.slot {
            ValSlot::Arena(addr) => self.store_scalar(parser, value.typ, *addr, Scalar::Int(result)),
            ValSlot::Cell(cell) => {
                cell.set(result);
                Ok(())
            }
            _ => Err(self.type_error(parser, "expected a numeric value")),
        }
    }

    /// Write a floating-point number into a value's payload.
    pub(crate) fn set_value_fp(
        &mut self,
        parser: &ParserState,
        value: &Value,
        result: f64,
    ) -> Result<()> {
        match &value.slot {
            ValSlot::Arena(addr) => self.store_scalar(parser, value.typ, *addr, Scalar::Fp(result)),
            ValSlot::Cell(cell) => {
                cell.set(result as i64);
                Ok(())
            }
            _ => Err(self.type_error(parser, "expected a numeric value")),
        }
    }

    /// Write a pointer into a value's payload.
    pub(crate) fn set_value_ptr(
        &mut self,
        parser: &ParserState,
        value: &Value,
        result: Address,
    ) -> Result<()> {
        match &value.slot {
            ValSlot::Arena(addr) => {
                self.store_scalar(parser, value.typ, *addr, Scalar::Ptr(result))
            }
            _ => Err(self.type_error(parser, "expected a pointer value")),
        }
    }
}
