//! Expression parsing and evaluation
//!
//! Expressions are parsed and evaluated in the same pass as everything
//! else: precedence climbing over the token stream, producing [`Operand`]s
//! that are either immediate scalars or lvalue views into arena storage.
//! When the parser is in any mode other than `Run` the full grammar is
//! still consumed, but nothing is looked up, allocated, or computed — this
//! is what lets not-taken branches mention names that don't exist.
//!
//! Short-circuit `&&`/`||` and the conditional operator evaluate their
//! untaken side in Skip mode. Argument lists evaluate left to right;
//! pointer arithmetic is scaled by the pointee size; arrays decay to
//! pointers in rvalue contexts.

use tracing::debug;

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::{ParserState, RunMode};
use crate::interpreter::table::Symbol;
use crate::interpreter::types::{BaseType, TypeId};
use crate::interpreter::values::{FuncBody, PlatformCell, Scalar, ValSlot, Value};
use crate::lexer::TokenKind;
use crate::memory::Address;

/// Where an evaluated operand's data lives.
#[derive(Debug, Clone)]
pub enum Rep {
    /// No value (skipped code, void calls)
    Void,
    /// An immediate scalar rvalue
    Imm(Scalar),
    /// An lvalue designating arena storage
    Slot(Address),
    /// An lvalue aliasing a host cell (platform variable)
    Cell(PlatformCell),
    /// A function designator
    Func(Value, Symbol),
}

/// An evaluated (sub)expression: a type, where its data is, and whether
/// assignment through it is allowed.
#[derive(Debug, Clone)]
pub struct Operand {
    pub typ: TypeId,
    pub rep: Rep,
    pub writable: bool,
}

impl Operand {
    pub fn void(void_type: TypeId) -> Self {
        Operand {
            typ: void_type,
            rep: Rep::Void,
            writable: false,
        }
    }

    pub fn imm(typ: TypeId, scalar: Scalar) -> Self {
        Operand {
            typ,
            rep: Rep::Imm(scalar),
            writable: false,
        }
    }

    pub fn slot(typ: TypeId, addr: Address, writable: bool) -> Self {
        Operand {
            typ,
            rep: Rep::Slot(addr),
            writable,
        }
    }

    pub fn is_lvalue(&self) -> bool {
        matches!(self.rep, Rep::Slot(_) | Rep::Cell(_))
    }
}

impl Interpreter {
    fn void_operand(&self) -> Operand {
        Operand::void(self.types.void_type)
    }

    /// Parse and evaluate a full expression (assignment level).
    pub(crate) fn expression(&mut self, parser: &mut ParserState) -> Result<Operand> {
        self.parse_assignment(parser)
    }

    /// Parse an expression and coerce the result to an integer.
    pub(crate) fn expression_int(&mut self, parser: &mut ParserState) -> Result<i64> {
        let operand = self.expression(parser)?;
        if parser.mode != RunMode::Run {
            return Ok(0);
        }
        self.coerce_int(parser, &operand)
    }

    /// Load an operand as a scalar, decaying arrays to pointers.
    pub(crate) fn load(&self, parser: &ParserState, operand: &Operand) -> Result<Scalar> {
        match &operand.rep {
            Rep::Imm(scalar) => Ok(*scalar),
            Rep::Slot(addr) => {
                if self.types.base(operand.typ) == BaseType::Array {
                    Ok(Scalar::Ptr(*addr))
                } else {
                    self.load_scalar(parser, operand.typ, *addr)
                }
            }
            Rep::Cell(cell) => Ok(Scalar::Int(cell.get())),
            Rep::Void | Rep::Func(..) => {
                Err(self.type_error(parser, "value expected"))
            }
        }
    }

    pub(crate) fn coerce_int(&self, parser: &ParserState, operand: &Operand) -> Result<i64> {
        let base = self.types.base(operand.typ);
        if !base.is_numeric() && base != BaseType::Pointer && base != BaseType::Array {
            return Err(self.type_error(parser, "integer value expected"));
        }
        Ok(self.load(parser, operand)?.as_i64())
    }

    pub(crate) fn coerce_fp(&self, parser: &ParserState, operand: &Operand) -> Result<f64> {
        if !self.types.base(operand.typ).is_numeric() {
            return Err(self.type_error(parser, "numeric value expected"));
        }
        Ok(self.load(parser, operand)?.as_f64())
    }

    /// The element type a pointer or array operand refers to.
    fn pointee(&self, parser: &ParserState, typ: TypeId) -> Result<TypeId> {
        self.types
            .from_type(typ)
            .ok_or_else(|| self.type_error(parser, "pointer type expected"))
    }

    // === assignment ===

    fn parse_assignment(&mut self, parser: &mut ParserState) -> Result<Operand> {
        let lhs = self.parse_ternary(parser)?;

        let op = self.peek_kind(parser);
        let compound = match op {
            TokenKind::Assign => None,
            TokenKind::AddAssign => Some(TokenKind::Plus),
            TokenKind::SubAssign => Some(TokenKind::Minus),
            TokenKind::MulAssign => Some(TokenKind::Star),
            TokenKind::DivAssign => Some(TokenKind::Slash),
            TokenKind::ModAssign => Some(TokenKind::Percent),
            TokenKind::ShlAssign => Some(TokenKind::ShiftLeft),
            TokenKind::ShrAssign => Some(TokenKind::ShiftRight),
            TokenKind::AndAssign => Some(TokenKind::Ampersand),
            TokenKind::OrAssign => Some(TokenKind::Pipe),
            TokenKind::XorAssign => Some(TokenKind::Caret),
            _ => return Ok(lhs),
        };
        self.get_token(parser);

        let rhs = self.parse_assignment(parser)?;
        if parser.mode != RunMode::Run {
            return Ok(lhs);
        }

        let source = match compound {
            None => rhs,
            Some(op) => self.binary_op(parser, &lhs, op, &rhs)?,
        };
        self.assign_operand(parser, &lhs, &source, false)?;
        Ok(lhs)
    }

    /// Store `source` into the lvalue `dest`, applying C conversion rules.
    /// `force` permits writing non-writable destinations (initialization).
    pub(crate) fn assign_operand(
        &mut self,
        parser: &ParserState,
        dest: &Operand,
        source: &Operand,
        force: bool,
    ) -> Result<()> {
        if parser.mode != RunMode::Run {
            return Ok(());
        }
        if !force && !dest.writable {
            return Err(self.type_error(parser, "can't assign to this"));
        }
        match &dest.rep {
            Rep::Cell(cell) => {
                let value = self.coerce_int(parser, source)?;
                cell.set(value);
                Ok(())
            }
            Rep::Slot(addr) => self.assign_to_slot(parser, dest.typ, *addr, source),
            _ => Err(self.type_error(parser, "can't assign to this")),
        }
    }

    fn assign_to_slot(
        &mut self,
        parser: &ParserState,
        dest_typ: TypeId,
        dest_addr: Address,
        source: &Operand,
    ) -> Result<()> {
        let dest_base = self.types.base(dest_typ);
        let src_base = self.types.base(source.typ);

        match dest_base {
            base if base.is_integer() || base == BaseType::Enum => {
                if !src_base.is_numeric() && src_base != BaseType::Enum {
                    return Err(self.assign_fail(parser, dest_typ, source.typ));
                }
                let scalar = self.load(parser, source)?;
                self.store_scalar(parser, dest_typ, dest_addr, scalar)
            }
            BaseType::Fp => {
                if !src_base.is_numeric() {
                    return Err(self.assign_fail(parser, dest_typ, source.typ));
                }
                let value = self.coerce_fp(parser, source)?;
                self.store_scalar(parser, dest_typ, dest_addr, Scalar::Fp(value))
            }
            BaseType::Pointer => {
                let ok = match src_base {
                    BaseType::Pointer | BaseType::Array => true,
                    // an integer zero makes a null pointer
                    base if base.is_integer() => self.load(parser, source)?.is_zero(),
                    _ => false,
                };
                if !ok {
                    return Err(self.assign_fail(parser, dest_typ, source.typ));
                }
                let scalar = self.load(parser, source)?;
                self.store_scalar(parser, dest_typ, dest_addr, Scalar::Ptr(scalar.as_u64()))
            }
            BaseType::Array => {
                if src_base != BaseType::Array {
                    return Err(self.assign_fail(parser, dest_typ, source.typ));
                }
                let Rep::Slot(src_addr) = source.rep else {
                    return Err(self.assign_fail(parser, dest_typ, source.typ));
                };
                let copy = self
                    .types
                    .sizeof(dest_typ, true)
                    .min(self.types.sizeof(source.typ, true));
                self.arena
                    .copy(dest_addr, src_addr, copy)
                    .map_err(|error| InterpError::from_arena(error, self.location(parser)))
            }
            BaseType::Struct | BaseType::Union => {
                if source.typ != dest_typ {
                    return Err(self.assign_fail(parser, dest_typ, source.typ));
                }
                let Rep::Slot(src_addr) = source.rep else {
                    return Err(self.assign_fail(parser, dest_typ, source.typ));
                };
                let size = self.types.sizeof(dest_typ, true);
                self.arena
                    .copy(dest_addr, src_addr, size)
                    .map_err(|error| InterpError::from_arena(error, self.location(parser)))
            }
            _ => Err(self.assign_fail(parser, dest_typ, source.typ)),
        }
    }

    fn assign_fail(&self, parser: &ParserState, dest: TypeId, source: TypeId) -> InterpError {
        let dest = self.types.display(dest, &self.interner);
        let source = self.types.display(source, &self.interner);
        self.type_error(
            parser,
            format!("can't assign '{}' from '{}'", dest, source),
        )
    }

    // === conditional and binary levels ===

    fn parse_ternary(&mut self, parser: &mut ParserState) -> Result<Operand> {
        let condition = self.parse_binary(parser, 0)?;
        if !self.accept(parser, TokenKind::Question) {
            return Ok(condition);
        }

        let take_first = if parser.mode == RunMode::Run {
            !self.load(parser, &condition)?.is_zero()
        } else {
            false
        };

        let old_mode = parser.mode;
        if parser.mode == RunMode::Run && !take_first {
            parser.mode = RunMode::Skip;
        }
        let first = self.parse_ternary(parser)?;
        parser.mode = old_mode;

        self.expect(parser, TokenKind::Colon)?;

        if parser.mode == RunMode::Run && take_first {
            parser.mode = RunMode::Skip;
        }
        let second = self.parse_ternary(parser)?;
        parser.mode = old_mode;

        if parser.mode != RunMode::Run {
            return Ok(self.void_operand());
        }
        Ok(if take_first { first } else { second })
    }

    /// Binary operator precedence, loosest first.
    fn binary_precedence(kind: &TokenKind) -> Option<u8> {
        match kind {
            TokenKind::LogicalOr => Some(1),
            TokenKind::LogicalAnd => Some(2),
            TokenKind::Pipe => Some(3),
            TokenKind::Caret => Some(4),
            TokenKind::Ampersand => Some(5),
            TokenKind::Equal | TokenKind::NotEqual => Some(6),
            TokenKind::LessThan
            | TokenKind::GreaterThan
            | TokenKind::LessEqual
            | TokenKind::GreaterEqual => Some(7),
            TokenKind::ShiftLeft | TokenKind::ShiftRight => Some(8),
            TokenKind::Plus | TokenKind::Minus => Some(9),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(10),
            _ => None,
        }
    }

    fn parse_binary(&mut self, parser: &mut ParserState, min_prec: u8) -> Result<Operand> {
        let mut lhs = self.parse_unary(parser)?;

        loop {
            let op = self.peek_kind(parser);
            let Some(prec) = Self::binary_precedence(&op) else {
                return Ok(lhs);
            };
            if prec < min_prec {
                return Ok(lhs);
            }
            self.get_token(parser);

            // short-circuit: the untaken right side parses in Skip mode
            if matches!(op, TokenKind::LogicalAnd | TokenKind::LogicalOr) {
                let lhs_true = if parser.mode == RunMode::Run {
                    !self.load(parser, &lhs)?.is_zero()
                } else {
                    false
                };
                let decided = parser.mode == RunMode::Run
                    && ((op == TokenKind::LogicalAnd && !lhs_true)
                        || (op == TokenKind::LogicalOr && lhs_true));

                let old_mode = parser.mode;
                if decided {
                    parser.mode = RunMode::Skip;
                }
                let rhs = self.parse_binary(parser, prec + 1)?;
                parser.mode = old_mode;

                if parser.mode != RunMode::Run {
                    lhs = self.void_operand();
                } else if decided {
                    lhs = Operand::imm(
                        self.types.int_type,
                        Scalar::Int(if lhs_true { 1 } else { 0 }),
                    );
                } else {
                    let rhs_true = !self.load(parser, &rhs)?.is_zero();
                    lhs = Operand::imm(
                        self.types.int_type,
                        Scalar::Int(if rhs_true { 1 } else { 0 }),
                    );
                }
                continue;
            }

            let rhs = self.parse_binary(parser, prec + 1)?;
            if parser.mode != RunMode::Run {
                lhs = self.void_operand();
                continue;
            }
            lhs = self.binary_op(parser, &lhs, op, &rhs)?;
        }
    }

    /// Apply a (non-short-circuit) binary operator to evaluated operands.
    fn binary_op(
        &mut self,
        parser: &ParserState,
        lhs: &Operand,
        op: TokenKind,
        rhs: &Operand,
    ) -> Result<Operand> {
        let lhs_base = self.types.base(lhs.typ);
        let rhs_base = self.types.base(rhs.typ);
        let lhs_ptr = matches!(lhs_base, BaseType::Pointer | BaseType::Array);
        let rhs_ptr = matches!(rhs_base, BaseType::Pointer | BaseType::Array);

        // pointer arithmetic and pointer comparison
        if lhs_ptr || rhs_ptr {
            return self.pointer_op(parser, lhs, op, rhs);
        }

        if lhs_base == BaseType::Fp || rhs_base == BaseType::Fp {
            let a = self.coerce_fp(parser, lhs)?;
            let b = self.coerce_fp(parser, rhs)?;
            return self.fp_op(parser, a, op, b);
        }

        let a = self.coerce_int(parser, lhs)?;
        let b = self.coerce_int(parser, rhs)?;

        let result_typ = self.arith_result_type(lhs.typ, rhs.typ);
        let value = match op {
            TokenKind::Plus => a.wrapping_add(b),
            TokenKind::Minus => a.wrapping_sub(b),
            TokenKind::Star => a.wrapping_mul(b),
            TokenKind::Slash => {
                if b == 0 {
                    return Err(InterpError::DivisionByZero {
                        location: self.location(parser),
                    });
                }
                a.wrapping_div(b)
            }
            TokenKind::Percent => {
                if b == 0 {
                    return Err(InterpError::DivisionByZero {
                        location: self.location(parser),
                    });
                }
                a.wrapping_rem(b)
            }
            TokenKind::ShiftLeft => a.wrapping_shl(b as u32),
            TokenKind::ShiftRight => a.wrapping_shr(b as u32),
            TokenKind::Ampersand => a & b,
            TokenKind::Pipe => a | b,
            TokenKind::Caret => a ^ b,
            TokenKind::Equal => return Ok(self.bool_operand(a == b)),
            TokenKind::NotEqual => return Ok(self.bool_operand(a != b)),
            TokenKind::LessThan => return Ok(self.bool_operand(a < b)),
            TokenKind::GreaterThan => return Ok(self.bool_operand(a > b)),
            TokenKind::LessEqual => return Ok(self.bool_operand(a <= b)),
            TokenKind::GreaterEqual => return Ok(self.bool_operand(a >= b)),
            _ => return Err(self.syntax_error(parser, "unexpected operator")),
        };
        Ok(Operand::imm(result_typ, Scalar::Int(value)))
    }

    fn bool_operand(&self, value: bool) -> Operand {
        Operand::imm(self.types.int_type, Scalar::Int(if value { 1 } else { 0 }))
    }

    /// Integer arithmetic result type: the wider operand wins, unsignedness
    /// is contagious, and nothing narrower than int survives promotion.
    fn arith_result_type(&self, lhs: TypeId, rhs: TypeId) -> TypeId {
        let types = &self.types;
        let wide = types.node(lhs).sizeof.max(types.node(rhs).sizeof)
            > crate::interpreter::types::INT_SIZE;
        let unsigned = !types.base(lhs).is_signed() && types.base(lhs).is_integer()
            || !types.base(rhs).is_signed() && types.base(rhs).is_integer();
        match (wide, unsigned) {
            (true, true) => types.unsigned_long_type,
            (true, false) => types.long_type,
            (false, true) => types.unsigned_int_type,
            (false, false) => types.int_type,
        }
    }

    fn fp_op(&self, parser: &ParserState, a: f64, op: TokenKind, b: f64) -> Result<Operand> {
        let value = match op {
            TokenKind::Plus => a + b,
            TokenKind::Minus => a - b,
            TokenKind::Star => a * b,
            TokenKind::Slash => {
                if b == 0.0 {
                    return Err(InterpError::DivisionByZero {
                        location: self.location(parser),
                    });
                }
                a / b
            }
            TokenKind::Equal => return Ok(self.bool_operand(a == b)),
            TokenKind::NotEqual => return Ok(self.bool_operand(a != b)),
            TokenKind::LessThan => return Ok(self.bool_operand(a < b)),
            TokenKind::GreaterThan => return Ok(self.bool_operand(a > b)),
            TokenKind::LessEqual => return Ok(self.bool_operand(a <= b)),
            TokenKind::GreaterEqual => return Ok(self.bool_operand(a >= b)),
            _ => {
                return Err(self.type_error(parser, "bad operator for floating point operands"))
            }
        };
        Ok(Operand::imm(self.types.fp_type, Scalar::Fp(value)))
    }

    fn pointer_op(
        &mut self,
        parser: &ParserState,
        lhs: &Operand,
        op: TokenKind,
        rhs: &Operand,
    ) -> Result<Operand> {
        let lhs_ptr = matches!(
            self.types.base(lhs.typ),
            BaseType::Pointer | BaseType::Array
        );
        let rhs_ptr = matches!(
            self.types.base(rhs.typ),
            BaseType::Pointer | BaseType::Array
        );

        match op {
            TokenKind::Plus | TokenKind::Minus if lhs_ptr && !rhs_ptr => {
                let base = self.load(parser, lhs)?.as_u64();
                let offset = self.coerce_int(parser, rhs)?;
                let element = self.pointee(parser, lhs.typ)?;
                let scale = self.types.sizeof(element, true).max(1) as i64;
                let signed = if op == TokenKind::Plus { offset } else { -offset };
                let target = (base as i64).wrapping_add(signed.wrapping_mul(scale)) as Address;
                let typ = match self.types.base(lhs.typ) {
                    BaseType::Array => self.types.pointer_to(element),
                    _ => lhs.typ,
                };
                Ok(Operand::imm(typ, Scalar::Ptr(target)))
            }
            TokenKind::Plus if rhs_ptr && !lhs_ptr => self.pointer_op(parser, rhs, op, lhs),
            TokenKind::Minus if lhs_ptr && rhs_ptr => {
                let a = self.load(parser, lhs)?.as_u64();
                let b = self.load(parser, rhs)?.as_u64();
                let element = self.pointee(parser, lhs.typ)?;
                let scale = self.types.sizeof(element, true).max(1) as i64;
                let diff = (a as i64).wrapping_sub(b as i64) / scale;
                Ok(Operand::imm(self.types.int_type, Scalar::Int(diff)))
            }
            TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::LessThan
            | TokenKind::GreaterThan
            | TokenKind::LessEqual
            | TokenKind::GreaterEqual => {
                let a = self.load(parser, lhs)?.as_u64();
                let b = self.load(parser, rhs)?.as_u64();
                let result = match op {
                    TokenKind::Equal => a == b,
                    TokenKind::NotEqual => a != b,
                    TokenKind::LessThan => a < b,
                    TokenKind::GreaterThan => a > b,
                    TokenKind::LessEqual => a <= b,
                    TokenKind::GreaterEqual => a >= b,
                    _ => unreachable!(),
                };
                Ok(self.bool_operand(result))
            }
            _ => Err(self.type_error(parser, "invalid operation on a pointer")),
        }
    }

    // === unary and postfix ===

    fn parse_unary(&mut self, parser: &mut ParserState) -> Result<Operand> {
        let token_kind = self.peek_kind(parser);
        match token_kind {
            TokenKind::Minus => {
                self.get_token(parser);
                let operand = self.parse_unary(parser)?;
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                match self.load(parser, &operand)? {
                    Scalar::Fp(value) => Ok(Operand::imm(self.types.fp_type, Scalar::Fp(-value))),
                    other => Ok(Operand::imm(
                        self.arith_result_type(operand.typ, self.types.int_type),
                        Scalar::Int(-other.as_i64()),
                    )),
                }
            }
            TokenKind::Plus => {
                self.get_token(parser);
                self.parse_unary(parser)
            }
            TokenKind::UnaryNot => {
                self.get_token(parser);
                let operand = self.parse_unary(parser)?;
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                let zero = self.load(parser, &operand)?.is_zero();
                Ok(self.bool_operand(zero))
            }
            TokenKind::Tilde => {
                self.get_token(parser);
                let operand = self.parse_unary(parser)?;
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                let value = self.coerce_int(parser, &operand)?;
                Ok(Operand::imm(self.types.int_type, Scalar::Int(!value)))
            }
            TokenKind::Star => {
                self.get_token(parser);
                let operand = self.parse_unary(parser)?;
                self.deref_operand(parser, &operand)
            }
            TokenKind::Ampersand => {
                self.get_token(parser);
                let operand = self.parse_unary(parser)?;
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                let Rep::Slot(addr) = operand.rep else {
                    return Err(self.type_error(parser, "can't get the address of this"));
                };
                let typ = self.types.pointer_to(operand.typ);
                Ok(Operand::imm(typ, Scalar::Ptr(addr)))
            }
            TokenKind::Increment | TokenKind::Decrement => {
                self.get_token(parser);
                let operand = self.parse_unary(parser)?;
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                self.increment(parser, &operand, token_kind == TokenKind::Increment)?;
                Ok(operand)
            }
            TokenKind::Sizeof => {
                self.get_token(parser);
                self.parse_sizeof(parser)
            }
            TokenKind::OpenParen => {
                // a cast when a type name follows, otherwise grouping
                let before = parser.pos();
                self.get_token(parser);
                if self.starts_type(parser) {
                    let Some((cast_typ, ident, _)) = self.type_parse(parser)? else {
                        return Err(self.syntax_error(parser, "invalid cast"));
                    };
                    if ident != Symbol::EMPTY {
                        return Err(self.syntax_error(parser, "invalid cast"));
                    }
                    self.expect(parser, TokenKind::CloseParen)?;
                    let operand = self.parse_unary(parser)?;
                    return self.cast_operand(parser, cast_typ, &operand);
                }
                parser.set_pos(before);
                self.parse_postfix(parser)
            }
            _ => self.parse_postfix(parser),
        }
    }

    fn deref_operand(&mut self, parser: &ParserState, operand: &Operand) -> Result<Operand> {
        if parser.mode != RunMode::Run {
            return Ok(self.void_operand());
        }
        let base = self.types.base(operand.typ);
        if !matches!(base, BaseType::Pointer | BaseType::Array) {
            return Err(self.type_error(parser, "can't dereference this non-pointer"));
        }
        let target = self.load(parser, operand)?.as_u64();
        if target == 0 {
            return Err(InterpError::NullDereference {
                location: self.location(parser),
            });
        }
        self.check_not_hidden(parser, target)?;
        let pointee = self.pointee(parser, operand.typ)?;
        Ok(Operand::slot(pointee, target, true))
    }

    fn increment(&mut self, parser: &ParserState, operand: &Operand, up: bool) -> Result<()> {
        let base = self.types.base(operand.typ);
        let step: i64 = if base == BaseType::Pointer {
            let element = self.pointee(parser, operand.typ)?;
            self.types.sizeof(element, true).max(1) as i64
        } else {
            1
        };
        if !operand.writable {
            return Err(self.type_error(parser, "can't modify this"));
        }
        let step = if up { step } else { -step };
        let current = self.load(parser, operand)?;
        let updated = match current {
            Scalar::Fp(value) => Scalar::Fp(value + step as f64),
            Scalar::Ptr(value) => Scalar::Ptr((value as i64).wrapping_add(step) as Address),
            other => Scalar::Int(other.as_i64().wrapping_add(step)),
        };
        match &operand.rep {
            Rep::Slot(addr) => self.store_scalar(parser, operand.typ, *addr, updated),
            Rep::Cell(cell) => {
                cell.set(updated.as_i64());
                Ok(())
            }
            _ => Err(self.type_error(parser, "can't modify this")),
        }
    }

    fn parse_sizeof(&mut self, parser: &mut ParserState) -> Result<Operand> {
        let typ = if self.peek_kind(parser) == TokenKind::OpenParen {
            let before = parser.pos();
            self.get_token(parser);
            if self.starts_type(parser) {
                let Some((typ, _, _)) = self.type_parse(parser)? else {
                    return Err(self.syntax_error(parser, "invalid sizeof operand"));
                };
                self.expect(parser, TokenKind::CloseParen)?;
                typ
            } else {
                parser.set_pos(before);
                let operand = self.parse_unary(parser)?;
                operand.typ
            }
        } else {
            let operand = self.parse_unary(parser)?;
            operand.typ
        };
        if parser.mode != RunMode::Run {
            return Ok(self.void_operand());
        }
        let size = self.types.sizeof(typ, true);
        Ok(Operand::imm(self.types.int_type, Scalar::Int(size as i64)))
    }

    fn cast_operand(
        &mut self,
        parser: &ParserState,
        cast_typ: TypeId,
        operand: &Operand,
    ) -> Result<Operand> {
        if parser.mode != RunMode::Run {
            return Ok(self.void_operand());
        }
        let base = self.types.base(cast_typ);
        let scalar = self.load(parser, operand)?;
        let converted = match base {
            BaseType::Fp => Scalar::Fp(scalar.as_f64()),
            BaseType::Pointer => Scalar::Ptr(scalar.as_u64()),
            base if base.is_integer() => {
                // narrow through the destination width
                let size = self.types.node(cast_typ).sizeof;
                let raw = scalar.as_i64();
                let narrowed = if size < 8 {
                    let shift = 64 - size * 8;
                    ((raw << shift) >> shift) as i64
                } else {
                    raw
                };
                Scalar::Int(narrowed)
            }
            BaseType::Void => return Ok(self.void_operand()),
            _ => return Err(self.type_error(parser, "invalid cast")),
        };
        Ok(Operand::imm(cast_typ, converted))
    }

    fn parse_postfix(&mut self, parser: &mut ParserState) -> Result<Operand> {
        let mut operand = self.parse_primary(parser)?;

        loop {
            match self.peek_kind(parser) {
                TokenKind::OpenBracket => {
                    self.get_token(parser);
                    let index = self.expression(parser)?;
                    self.expect(parser, TokenKind::CloseBracket)?;
                    operand = self.index_operand(parser, &operand, &index)?;
                }
                TokenKind::Dot => {
                    self.get_token(parser);
                    let token = self.get_token(parser);
                    let TokenKind::Ident(member) = token.kind else {
                        return Err(self.syntax_error(parser, "member name expected"));
                    };
                    operand = self.member_operand(parser, &operand, member, false)?;
                }
                TokenKind::Arrow => {
                    self.get_token(parser);
                    let token = self.get_token(parser);
                    let TokenKind::Ident(member) = token.kind else {
                        return Err(self.syntax_error(parser, "member name expected"));
                    };
                    operand = self.member_operand(parser, &operand, member, true)?;
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    let up = self.peek_kind(parser) == TokenKind::Increment;
                    self.get_token(parser);
                    if parser.mode == RunMode::Run {
                        let original = self.load(parser, &operand)?;
                        self.increment(parser, &operand, up)?;
                        operand = Operand::imm(operand.typ, original);
                    }
                }
                TokenKind::OpenParen => {
                    if parser.mode != RunMode::Run {
                        // consume the argument list without dispatching
                        self.get_token(parser);
                        if self.peek_kind(parser) != TokenKind::CloseParen {
                            loop {
                                self.expression(parser)?;
                                if !self.accept(parser, TokenKind::Comma) {
                                    break;
                                }
                            }
                        }
                        self.expect(parser, TokenKind::CloseParen)?;
                        operand = self.void_operand();
                        continue;
                    }
                    let Rep::Func(value, name) = operand.rep.clone() else {
                        return Err(self.type_error(parser, "this isn't a function"));
                    };
                    operand = self.call_function(parser, name, &value)?;
                }
                _ => return Ok(operand),
            }
        }
    }

    fn index_operand(
        &mut self,
        parser: &ParserState,
        operand: &Operand,
        index: &Operand,
    ) -> Result<Operand> {
        if parser.mode != RunMode::Run {
            return Ok(self.void_operand());
        }
        let base = self.types.base(operand.typ);
        let index = self.coerce_int(parser, index)?;
        match base {
            BaseType::Array => {
                let Rep::Slot(addr) = operand.rep else {
                    return Err(self.type_error(parser, "can't index this"));
                };
                let node = self.types.node(operand.typ);
                if node.array_size > 0 && (index < 0 || index as usize >= node.array_size) {
                    return Err(self.type_error(
                        parser,
                        format!(
                            "array index {} out of bounds for size {}",
                            index, node.array_size
                        ),
                    ));
                }
                let element = self.pointee(parser, operand.typ)?;
                let size = self.types.sizeof(element, true).max(1);
                let element_addr = (addr as i64 + index * size as i64) as Address;
                Ok(Operand::slot(element, element_addr, operand.writable))
            }
            BaseType::Pointer => {
                let target = self.load(parser, operand)?.as_u64();
                if target == 0 {
                    return Err(InterpError::NullDereference {
                        location: self.location(parser),
                    });
                }
                let element = self.pointee(parser, operand.typ)?;
                let size = self.types.sizeof(element, true).max(1);
                let addr = (target as i64 + index * size as i64) as Address;
                self.check_not_hidden(parser, addr)?;
                Ok(Operand::slot(element, addr, true))
            }
            _ => Err(self.type_error(parser, "this can't be indexed")),
        }
    }

    fn member_operand(
        &mut self,
        parser: &ParserState,
        operand: &Operand,
        member: Symbol,
        through_pointer: bool,
    ) -> Result<Operand> {
        if parser.mode != RunMode::Run {
            return Ok(self.void_operand());
        }

        let (aggregate_typ, base_addr) = if through_pointer {
            let target = self.deref_operand(parser, operand)?;
            let Rep::Slot(addr) = target.rep else {
                return Err(self.type_error(parser, "pointer to a struct or union expected"));
            };
            (target.typ, addr)
        } else {
            let Rep::Slot(addr) = operand.rep else {
                return Err(self.type_error(parser, "struct or union expected"));
            };
            (operand.typ, addr)
        };

        let node = self.types.node(aggregate_typ);
        if !matches!(node.base, BaseType::Struct | BaseType::Union) {
            let display = self.types.display(aggregate_typ, &self.interner);
            return Err(self.type_error(
                parser,
                format!("'{}' isn't a struct or union", display),
            ));
        }
        let Some(members) = &node.members else {
            let display = self.types.display(aggregate_typ, &self.interner);
            return Err(self.type_error(parser, format!("'{}' isn't fully defined", display)));
        };
        let Some(entry) = members.table.get(member) else {
            let display = self.types.display(aggregate_typ, &self.interner);
            let name = self.interner.resolve(member).to_string();
            return Err(self.type_error(
                parser,
                format!("'{}' doesn't have a member called '{}'", display, name),
            ));
        };
        let found = entry.value;
        Ok(Operand::slot(
            found.typ,
            base_addr + found.offset as Address,
            if through_pointer { true } else { operand.writable },
        ))
    }

    fn parse_primary(&mut self, parser: &mut ParserState) -> Result<Operand> {
        let token = self.get_token(parser);
        match token.kind {
            TokenKind::IntLit(value) => {
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                Ok(Operand::imm(self.types.int_type, Scalar::Int(value)))
            }
            TokenKind::FloatLit(value) => {
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                Ok(Operand::imm(self.types.fp_type, Scalar::Fp(value)))
            }
            TokenKind::CharLit(value) => {
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                Ok(Operand::imm(
                    self.types.char_type,
                    Scalar::Int(value as i8 as i64),
                ))
            }
            TokenKind::StrLit(contents) => {
                if parser.mode != RunMode::Run {
                    return Ok(self.void_operand());
                }
                let value = self.string_literal_value(parser, contents)?;
                let addr = value.address().expect("string literals live in the arena");
                Ok(Operand::slot(value.typ, addr, false))
            }
            TokenKind::OpenParen => {
                let operand = self.expression(parser)?;
                self.expect(parser, TokenKind::CloseParen)?;
                Ok(operand)
            }
            TokenKind::Ident(name) => self.identifier_operand(parser, name),
            other => Err(self.syntax_error(parser, format!("unexpected {}", other))),
        }
    }

    fn identifier_operand(&mut self, parser: &mut ParserState, name: Symbol) -> Result<Operand> {
        if parser.mode != RunMode::Run {
            // still allow call syntax and the rest of the postfix grammar
            return Ok(self.void_operand());
        }

        let value = self.variable_get(parser, name)?;
        match &value.slot {
            ValSlot::Arena(addr) => Ok(Operand::slot(value.typ, *addr, value.is_lvalue)),
            ValSlot::Cell(cell) => Ok(Operand {
                typ: value.typ,
                rep: Rep::Cell(cell.clone()),
                writable: value.is_lvalue,
            }),
            ValSlot::Func(_) => Ok(Operand {
                typ: value.typ,
                rep: Rep::Func(value.clone(), name),
                writable: false,
            }),
            ValSlot::Mac(id) => {
                let id = *id;
                self.expand_macro(parser, name, id)
            }
            ValSlot::Ty(_) => Err(self.type_error(
                parser,
                format!(
                    "'{}' is a type, not a value",
                    self.interner.resolve(name)
                ),
            )),
        }
    }

    // === calls ===

    /// Parse `(args...)` and invoke a function: intrinsic functions get
    /// their evaluated arguments and a return slot; scripted functions get
    /// a fresh frame, bound parameters, and their token body executed until
    /// `return` or the body end.
    pub(crate) fn call_function(
        &mut self,
        parser: &mut ParserState,
        name: Symbol,
        func_value: &Value,
    ) -> Result<Operand> {
        self.expect(parser, TokenKind::OpenParen)?;

        // evaluate arguments left to right
        let mut args: Vec<Operand> = Vec::new();
        if self.peek_kind(parser) != TokenKind::CloseParen {
            loop {
                args.push(self.expression(parser)?);
                if !self.accept(parser, TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(parser, TokenKind::CloseParen)?;

        if parser.mode != RunMode::Run {
            return Ok(self.void_operand());
        }

        self.invoke_function(parser, name, func_value, &args)
    }

    /// Dispatch an already-evaluated argument list to a function. Also the
    /// host's path into `main`.
    pub(crate) fn invoke_function(
        &mut self,
        parser: &mut ParserState,
        name: Symbol,
        func_value: &Value,
        args: &[Operand],
    ) -> Result<Operand> {
        let ValSlot::Func(func_id) = &func_value.slot else {
            return Err(self.type_error(
                parser,
                format!("'{}' isn't a function", self.interner.resolve(name)),
            ));
        };
        let def = self.functions[func_id.0 as usize].clone();

        if args.len() < def.params.len() || (args.len() > def.params.len() && !def.varargs) {
            return Err(InterpError::ArgumentCount {
                function: self.interner.resolve(name).to_string(),
                expected: def.params.len(),
                got: args.len(),
                location: self.location(parser),
            });
        }

        debug!(function = self.interner.resolve(name), args = args.len(), "call");

        match def.body {
            FuncBody::Intrinsic(native) => self.call_intrinsic(parser, &def, native, args),
            FuncBody::Tokens(chunk) => self.call_scripted(parser, name, &def, chunk, args),
            FuncBody::Forward => Err(self.type_error(
                parser,
                format!(
                    "function '{}' is declared but never defined",
                    self.interner.resolve(name)
                ),
            )),
        }
    }

    fn call_intrinsic(
        &mut self,
        parser: &mut ParserState,
        def: &crate::interpreter::values::FuncDef,
        native: crate::platform::library::NativeFn,
        args: &[Operand],
    ) -> Result<Operand> {
        let ret_slot = self.alloc_value_from_type(parser, def.ret_type, false, false)?;

        // materialize arguments as stack values for the native entry;
        // pop_frame can't reach these pre-frame temporaries, so every
        // failure from here on must unwind them by hand
        let mut arg_values = Vec::with_capacity(args.len());
        let run = (|interp: &mut Self| -> Result<()> {
            for (index, arg) in args.iter().enumerate() {
                let target_typ = match def.params.get(index) {
                    Some(&(_, typ)) => typ,
                    None => interp.vararg_type(arg),
                };
                let value = interp.alloc_value_from_type(parser, target_typ, false, false)?;
                let dest = Operand::slot(
                    target_typ,
                    value.address().expect("argument payload is in the arena"),
                    true,
                );
                arg_values.push(value);
                interp.assign_operand(parser, &dest, arg, true)?;
            }
            native(interp, parser, &ret_slot, &arg_values)
        })(self);
        if let Err(error) = run {
            for value in arg_values.iter().rev() {
                self.discard_temporary(value);
            }
            self.discard_temporary(&ret_slot);
            return Err(error);
        }

        // balanced pop: arguments in reverse, then the return slot once
        // its scalar has been captured
        let captured = self.capture_return(parser, def.ret_type, &ret_slot);
        for value in arg_values.iter().rev() {
            let size = self.value_stack_size(value);
            if let Err(error) = self.arena.pop(size) {
                self.discard_temporary(&ret_slot);
                return Err(InterpError::from_arena(error, self.location(parser)));
            }
        }
        match captured {
            Ok(result) => self.finish_return(parser, def.ret_type, ret_slot, result),
            Err(error) => {
                self.discard_temporary(&ret_slot);
                Err(error)
            }
        }
    }

    /// The type a vararg argument travels as: arrays decay, everything
    /// else keeps its own type.
    fn vararg_type(&mut self, arg: &Operand) -> TypeId {
        match self.types.base(arg.typ) {
            BaseType::Array => {
                let element = self.types.from_type(arg.typ).unwrap_or(self.types.char_type);
                self.types.pointer_to(element)
            }
            _ => arg.typ,
        }
    }

    fn call_scripted(
        &mut self,
        parser: &mut ParserState,
        name: Symbol,
        def: &crate::interpreter::values::FuncDef,
        body: crate::interpreter::parser::ChunkId,
        args: &[Operand],
    ) -> Result<Operand> {
        let ret_slot = self.alloc_value_from_type(parser, def.ret_type, false, false)?;

        self.stack_frame_add(parser, name, ret_slot.clone())?;

        // bind parameters inside the callee frame, in declaration order
        let mut bind_error = None;
        for (index, &(param_name, param_typ)) in def.params.iter().enumerate() {
            let result = (|| -> Result<()> {
                let value = self.alloc_value_from_type(parser, param_typ, true, false)?;
                let dest = Operand::slot(
                    param_typ,
                    value.address().expect("parameter payload is in the arena"),
                    true,
                );
                self.assign_operand(parser, &dest, &args[index], true)?;
                let bound = self.variable_bind(parser, param_name, value)?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.params.push(bound);
                }
                Ok(())
            })();
            if let Err(error) = result {
                bind_error = Some(error);
                break;
            }
        }
        if let Some(error) = bind_error {
            // the frame reclaims the bound parameters; the return slot sits
            // below the frame link and needs its own pop
            let mut scratch = parser.clone();
            let _ = self.stack_frame_pop(&mut scratch);
            self.discard_temporary(&ret_slot);
            return Err(error);
        }

        // execute the token body until return or the end of the block
        let chunk_file = self.chunks[body.0 as usize].file;
        let mut body_parser = ParserState::new(body, chunk_file, true, parser.debug);
        let result = loop {
            match self.statement(&mut body_parser) {
                Err(error) => break Err(error),
                Ok(_) => {}
            }
            match body_parser.mode {
                RunMode::Return => break Ok(()),
                RunMode::Goto => {
                    if self.peek_kind(&body_parser) == TokenKind::Eof {
                        // rewind and scan from the top for a backward label,
                        // but only when the label exists at all
                        let target = body_parser.search_goto;
                        let found = target
                            .map(|label| self.chunk_has_label(body, label))
                            .unwrap_or(false);
                        if !found {
                            let label = target
                                .map(|symbol| self.interner.resolve(symbol).to_string())
                                .unwrap_or_default();
                            break Err(self.syntax_error(
                                &body_parser,
                                format!("goto label '{}' wasn't found", label),
                            ));
                        }
                        body_parser.cursor = 0;
                    }
                }
                _ => {
                    if self.peek_kind(&body_parser) == TokenKind::Eof {
                        break Ok(());
                    }
                }
            }
        };

        let mut scratch = body_parser;
        let frame_result = self.stack_frame_pop(&mut scratch);
        let captured = match (frame_result, result) {
            (Ok(()), Ok(())) => self.capture_return(parser, def.ret_type, &ret_slot),
            // the body's own error outranks a failed unwind
            (_, Err(error)) | (Err(error), _) => Err(error),
        };
        match captured {
            Ok(result) => self.finish_return(parser, def.ret_type, ret_slot, result),
            Err(error) => {
                self.discard_temporary(&ret_slot);
                Err(error)
            }
        }
    }

    /// Whether a `label:` for `label` appears anywhere in a token chunk.
    fn chunk_has_label(&self, chunk: crate::interpreter::parser::ChunkId, label: Symbol) -> bool {
        let tokens = &self.chunks[chunk.0 as usize].tokens;
        tokens.windows(2).any(|pair| {
            matches!(&pair[0].kind, TokenKind::Ident(name) if *name == label)
                && pair[1].kind == TokenKind::Colon
        })
    }

    /// Read a scalar return slot before it's popped; aggregates stay put.
    fn capture_return(
        &self,
        parser: &ParserState,
        ret_type: TypeId,
        ret_slot: &Value,
    ) -> Result<Option<Scalar>> {
        let base = self.types.base(ret_type);
        if base == BaseType::Void {
            return Ok(None);
        }
        if base.is_numeric() || base == BaseType::Pointer || base == BaseType::Enum {
            let addr = ret_slot.address().expect("return slot is in the arena");
            return Ok(Some(self.load_scalar(parser, ret_type, addr)?));
        }
        Ok(None)
    }

    /// Pop a scalar return slot (its value is already captured); aggregate
    /// returns keep their slot alive until the frame unwinds.
    fn finish_return(
        &mut self,
        parser: &ParserState,
        ret_type: TypeId,
        ret_slot: Value,
        captured: Option<Scalar>,
    ) -> Result<Operand> {
        match captured {
            Some(scalar) => {
                let size = self.value_stack_size(&ret_slot);
                self.arena
                    .pop(size)
                    .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
                Ok(Operand::imm(ret_type, scalar))
            }
            None => {
                if self.types.base(ret_type) == BaseType::Void {
                    let size = self.value_stack_size(&ret_slot);
                    self.arena
                        .pop(size)
                        .map_err(|error| InterpError::from_arena(error, self.location(parser)))?;
                    return Ok(self.void_operand());
                }
                let addr = ret_slot.address().expect("return slot is in the arena");
                Ok(Operand::slot(ret_type, addr, false))
            }
        }
    }

    /// Expand a macro reference: parameterized macros bind their arguments
    /// in a fresh frame, then the body evaluates as an expression.
    fn expand_macro(
        &mut self,
        parser: &mut ParserState,
        name: Symbol,
        macro_id: crate::interpreter::values::MacroId,
    ) -> Result<Operand> {
        let def = self.macros[macro_id.0 as usize].clone();
        let chunk_file = self.chunks[def.body.0 as usize].file;

        match &def.params {
            None => {
                let mut body_parser = ParserState::new(def.body, chunk_file, true, parser.debug);
                body_parser.scope_id = parser.scope_id;
                self.expression(&mut body_parser)
            }
            Some(params) => {
                self.expect(parser, TokenKind::OpenParen)?;
                let mut args = Vec::new();
                if self.peek_kind(parser) != TokenKind::CloseParen {
                    loop {
                        args.push(self.expression(parser)?);
                        if !self.accept(parser, TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(parser, TokenKind::CloseParen)?;

                if args.len() != params.len() {
                    return Err(InterpError::ArgumentCount {
                        function: self.interner.resolve(name).to_string(),
                        expected: params.len(),
                        got: args.len(),
                        location: self.location(parser),
                    });
                }

                // a macro call gets a frame so its parameters are locals
                let ret_slot = self.alloc_value_from_type(parser, self.types.int_type, false, false)?;
                self.stack_frame_add(parser, name, ret_slot.clone())?;
                let mut result = Ok(self.void_operand());
                for (index, &param_name) in params.iter().enumerate() {
                    result = (|| {
                        let value = self.alloc_value_from_type(
                            parser,
                            args[index].typ,
                            true,
                            false,
                        )?;
                        let dest = Operand::slot(
                            args[index].typ,
                            value.address().expect("macro argument is in the arena"),
                            true,
                        );
                        self.assign_operand(parser, &dest, &args[index], true)?;
                        self.variable_bind(parser, param_name, value)?;
                        Ok(self.void_operand())
                    })();
                    if result.is_err() {
                        break;
                    }
                }
                if result.is_ok() {
                    let mut body_parser =
                        ParserState::new(def.body, chunk_file, true, parser.debug);
                    result = self.expression(&mut body_parser);
                }

                // the macro result must be captured before the frame pops
                let captured = match &result {
                    Ok(operand) => match operand.rep {
                        Rep::Imm(scalar) => Ok((operand.typ, scalar)),
                        _ => self.load(parser, operand).map(|scalar| (operand.typ, scalar)),
                    },
                    Err(error) => Err(error.clone()),
                };

                // the frame reclaims the bound parameters; the return slot
                // sits below the frame link and is popped unconditionally,
                // error or not
                let mut scratch = parser.clone();
                let frame_result = self.stack_frame_pop(&mut scratch);
                self.discard_temporary(&ret_slot);
                frame_result?;
                let (result_typ, scalar) = captured?;
                Ok(Operand::imm(result_typ, scalar))
            }
        }
    }

    /// Error-path cleanup for a stack temporary that sits below a frame
    /// link, out of `pop_frame`'s reach. A secondary pop failure is
    /// swallowed so the original error stays visible.
    fn discard_temporary(&mut self, value: &Value) {
        let size = self.value_stack_size(value);
        let _ = self.arena.pop(size);
    }
}
