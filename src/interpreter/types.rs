//! The type tree and type grammar
//!
//! Types form a tree rooted at an "uber type". Base scalar types are fixed
//! slots created at startup; every derived type (pointer-to, array-of,
//! named struct/union/enum) is created once per (parent, kind, array-size,
//! identifier) tuple and cached at the head of the parent's derived list,
//! so type equality is [`TypeId`] equality.
//!
//! Sizes are fixed and platform independent (see [`crate::memory`]).
//! Struct layout follows declaration order with per-member alignment
//! padding; unions overlay every member at offset zero. A struct or union
//! whose member table is absent is a forward declaration: usable through a
//! pointer, a type error by value.

use crate::interpreter::errors::Result;
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::{ParserState, RunMode};
use crate::interpreter::table::{DeclSite, Symbol, Table};
use crate::interpreter::values::ValSlot;
use crate::lexer::TokenKind;
use crate::memory::ALIGN;

pub const CHAR_SIZE: usize = 1;
pub const SHORT_SIZE: usize = 2;
pub const INT_SIZE: usize = 4;
pub const LONG_SIZE: usize = 8;
pub const FP_SIZE: usize = 8;
pub const POINTER_SIZE: usize = 8;

/// Struct/union member tables get this many buckets.
const STRUCT_TABLE_SIZE: usize = 11;

/// What kind of type a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Void,
    Int,
    Short,
    Char,
    Long,
    UnsignedInt,
    UnsignedShort,
    UnsignedChar,
    UnsignedLong,
    Fp,
    Function,
    Macro,
    Pointer,
    Array,
    Struct,
    Union,
    Enum,
    GotoLabel,
    /// A type for storing types (typedef values)
    TypeOfType,
}

impl BaseType {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BaseType::Int
                | BaseType::Short
                | BaseType::Char
                | BaseType::Long
                | BaseType::UnsignedInt
                | BaseType::UnsignedShort
                | BaseType::UnsignedChar
                | BaseType::UnsignedLong
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self == BaseType::Fp
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BaseType::Int | BaseType::Short | BaseType::Char | BaseType::Long
        )
    }
}

/// Handle into the interpreter's type tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// A struct or union member: its type and byte offset from the aggregate's
/// start (always zero for unions).
#[derive(Debug, Clone, Copy)]
pub struct Member {
    pub typ: TypeId,
    pub offset: usize,
}

/// Member table plus declaration order, which layout and printing depend on.
#[derive(Debug, Clone)]
pub struct StructMembers {
    pub table: Table<Member>,
    pub order: Vec<Symbol>,
}

impl StructMembers {
    pub fn new() -> Self {
        StructMembers {
            table: Table::new(STRUCT_TABLE_SIZE),
            order: Vec::new(),
        }
    }
}

impl Default for StructMembers {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct TypeNode {
    pub base: BaseType,
    pub array_size: usize,
    pub sizeof: usize,
    pub align: usize,
    pub ident: Symbol,
    pub from: Option<TypeId>,
    pub derived: Vec<TypeId>,
    /// `Some` once a struct/union/enum body has been parsed; `None` means
    /// forward declaration.
    pub members: Option<StructMembers>,
}

/// The tree of every type the instance knows about.
#[derive(Debug)]
pub struct TypeTree {
    nodes: Vec<TypeNode>,
    pub uber: TypeId,
    pub int_type: TypeId,
    pub short_type: TypeId,
    pub char_type: TypeId,
    pub long_type: TypeId,
    pub unsigned_int_type: TypeId,
    pub unsigned_short_type: TypeId,
    pub unsigned_char_type: TypeId,
    pub unsigned_long_type: TypeId,
    pub fp_type: TypeId,
    pub void_type: TypeId,
    pub function_type: TypeId,
    pub macro_type: TypeId,
    pub goto_label_type: TypeId,
    pub type_type: TypeId,
    pub char_array_type: TypeId,
    pub char_ptr_type: TypeId,
    pub char_ptr_ptr_type: TypeId,
    pub void_ptr_type: TypeId,
}

impl TypeTree {
    pub fn new() -> Self {
        let mut nodes = Vec::new();
        let mut add_base = |base: BaseType, sizeof: usize, align: usize| {
            let id = TypeId(nodes.len() as u32);
            nodes.push(TypeNode {
                base,
                array_size: 0,
                sizeof,
                align,
                ident: Symbol::EMPTY,
                from: None,
                derived: Vec::new(),
                members: None,
            });
            id
        };

        let uber = add_base(BaseType::Void, 0, 1);
        let int_type = add_base(BaseType::Int, INT_SIZE, INT_SIZE);
        let short_type = add_base(BaseType::Short, SHORT_SIZE, SHORT_SIZE);
        let char_type = add_base(BaseType::Char, CHAR_SIZE, CHAR_SIZE);
        let long_type = add_base(BaseType::Long, LONG_SIZE, LONG_SIZE);
        let unsigned_int_type = add_base(BaseType::UnsignedInt, INT_SIZE, INT_SIZE);
        let unsigned_short_type = add_base(BaseType::UnsignedShort, SHORT_SIZE, SHORT_SIZE);
        let unsigned_char_type = add_base(BaseType::UnsignedChar, CHAR_SIZE, CHAR_SIZE);
        let unsigned_long_type = add_base(BaseType::UnsignedLong, LONG_SIZE, LONG_SIZE);
        let fp_type = add_base(BaseType::Fp, FP_SIZE, FP_SIZE);
        let void_type = add_base(BaseType::Void, 0, 1);
        let function_type = add_base(BaseType::Function, INT_SIZE, INT_SIZE);
        let macro_type = add_base(BaseType::Macro, INT_SIZE, INT_SIZE);
        let goto_label_type = add_base(BaseType::GotoLabel, 0, 1);
        let type_type = add_base(BaseType::TypeOfType, POINTER_SIZE, POINTER_SIZE);

        let mut tree = TypeTree {
            nodes,
            uber,
            int_type,
            short_type,
            char_type,
            long_type,
            unsigned_int_type,
            unsigned_short_type,
            unsigned_char_type,
            unsigned_long_type,
            fp_type,
            void_type,
            function_type,
            macro_type,
            goto_label_type,
            type_type,
            char_array_type: TypeId(0),
            char_ptr_type: TypeId(0),
            char_ptr_ptr_type: TypeId(0),
            void_ptr_type: TypeId(0),
        };

        tree.char_array_type = tree.get_matching(char_type, BaseType::Array, 0, Symbol::EMPTY);
        tree.char_ptr_type = tree.pointer_to(char_type);
        tree.char_ptr_ptr_type = tree.pointer_to(tree.char_ptr_type);
        tree.void_ptr_type = tree.pointer_to(void_type);
        tree
    }

    pub fn node(&self, id: TypeId) -> &TypeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: TypeId) -> &mut TypeNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn base(&self, id: TypeId) -> BaseType {
        self.node(id).base
    }

    /// The type this one derives from: the pointee of a pointer, the
    /// element of an array.
    pub fn from_type(&self, id: TypeId) -> Option<TypeId> {
        self.node(id).from
    }

    pub fn find_matching(
        &self,
        parent: TypeId,
        base: BaseType,
        array_size: usize,
        ident: Symbol,
    ) -> Option<TypeId> {
        self.node(parent)
            .derived
            .iter()
            .copied()
            .find(|&child| {
                let node = self.node(child);
                node.base == base && node.array_size == array_size && node.ident == ident
            })
    }

    /// Given a parent type, get the matching derived type, creating and
    /// caching it when it doesn't exist yet.
    pub fn get_matching(
        &mut self,
        parent: TypeId,
        base: BaseType,
        array_size: usize,
        ident: Symbol,
    ) -> TypeId {
        if let Some(existing) = self.find_matching(parent, base, array_size, ident) {
            return existing;
        }

        let (sizeof, align) = match base {
            BaseType::Pointer => (POINTER_SIZE, POINTER_SIZE),
            BaseType::Array => {
                let element = self.node(parent);
                (element.sizeof * array_size, element.align)
            }
            BaseType::Enum => (INT_SIZE, INT_SIZE),
            // structs and unions grow as members are added
            _ => (0, 1),
        };

        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(TypeNode {
            base,
            array_size,
            sizeof,
            align,
            ident,
            from: Some(parent),
            derived: Vec::new(),
            members: None,
        });
        self.node_mut(parent).derived.insert(0, id);
        id
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.get_matching(pointee, BaseType::Pointer, 0, Symbol::EMPTY)
    }

    pub fn array_of(&mut self, element: TypeId, size: usize) -> TypeId {
        self.get_matching(element, BaseType::Array, size, Symbol::EMPTY)
    }

    /// Memory needed for a variable of this type. Integer scalars get a
    /// full alignment unit so a narrower type can later be widened in
    /// place; `compact` asks for the exact C size instead.
    pub fn type_size(&self, id: TypeId, array_size: usize, compact: bool) -> usize {
        let node = self.node(id);
        if node.base.is_integer() && !compact {
            ALIGN
        } else if node.base == BaseType::Array {
            let element = node.from.expect("array types always have an element");
            self.node(element).sizeof * array_size
        } else {
            node.sizeof
        }
    }

    /// Storage for a value of this type using its own array size.
    pub fn sizeof(&self, id: TypeId, compact: bool) -> usize {
        self.type_size(id, self.node(id).array_size, compact)
    }

    /// A type is forward-declared iff it is a struct/union with no member
    /// table, or an array of a forward-declared element.
    pub fn is_forward_declared(&self, id: TypeId) -> bool {
        let node = self.node(id);
        match node.base {
            BaseType::Array => node
                .from
                .map(|element| self.is_forward_declared(element))
                .unwrap_or(false),
            BaseType::Struct | BaseType::Union => node.members.is_none(),
            _ => false,
        }
    }

    /// Human-readable type name for diagnostics.
    pub fn display(&self, id: TypeId, interner: &crate::interpreter::table::Interner) -> String {
        let node = self.node(id);
        match node.base {
            BaseType::Void => "void".to_string(),
            BaseType::Int => "int".to_string(),
            BaseType::Short => "short".to_string(),
            BaseType::Char => "char".to_string(),
            BaseType::Long => "long".to_string(),
            BaseType::UnsignedInt => "unsigned int".to_string(),
            BaseType::UnsignedShort => "unsigned short".to_string(),
            BaseType::UnsignedChar => "unsigned char".to_string(),
            BaseType::UnsignedLong => "unsigned long".to_string(),
            BaseType::Fp => "double".to_string(),
            BaseType::Function => "function".to_string(),
            BaseType::Macro => "macro".to_string(),
            BaseType::Pointer => match node.from {
                Some(pointee) => format!("{}*", self.display(pointee, interner)),
                None => "pointer".to_string(),
            },
            BaseType::Array => match node.from {
                Some(element) => {
                    format!("{}[{}]", self.display(element, interner), node.array_size)
                }
                None => "array".to_string(),
            },
            BaseType::Struct => format!("struct {}", interner.resolve(node.ident)),
            BaseType::Union => format!("union {}", interner.resolve(node.ident)),
            BaseType::Enum => format!("enum {}", interner.resolve(node.ident)),
            BaseType::GotoLabel => "label".to_string(),
            BaseType::TypeOfType => "type".to_string(),
        }
    }
}

impl Default for TypeTree {
    fn default() -> Self {
        Self::new()
    }
}

// === type grammar ===

impl Interpreter {
    /// Parse the leading part of a type: storage qualifiers (static is
    /// remembered, the rest are skipped), signedness, and the base type
    /// keyword, struct/union/enum definition, or typedef'd identifier.
    /// Returns `None` (with the cursor restored) when no type starts here.
    pub(crate) fn type_parse_front(
        &mut self,
        parser: &mut ParserState,
    ) -> Result<Option<(TypeId, bool)>> {
        let before = parser.pos();
        let mut is_static = false;

        let mut token = self.get_token(parser);
        loop {
            match token.kind {
                TokenKind::Static => {
                    is_static = true;
                    token = self.get_token(parser);
                }
                TokenKind::Auto | TokenKind::Register | TokenKind::Extern => {
                    token = self.get_token(parser);
                }
                _ => break,
            }
        }

        // signed/unsigned with or without a trailing base keyword
        let mut unsigned = false;
        if matches!(token.kind, TokenKind::Signed | TokenKind::Unsigned) {
            unsigned = token.kind == TokenKind::Unsigned;
            match self.peek_kind(parser) {
                TokenKind::Int | TokenKind::Long | TokenKind::Short | TokenKind::Char => {
                    token = self.get_token(parser);
                }
                _ => {
                    let typ = if unsigned {
                        self.types.unsigned_int_type
                    } else {
                        self.types.int_type
                    };
                    return Ok(Some((typ, is_static)));
                }
            }
        }

        let typ = match token.kind {
            TokenKind::Int => {
                if unsigned {
                    self.types.unsigned_int_type
                } else {
                    self.types.int_type
                }
            }
            TokenKind::Short => {
                if unsigned {
                    self.types.unsigned_short_type
                } else {
                    self.types.short_type
                }
            }
            TokenKind::Char => {
                if unsigned {
                    self.types.unsigned_char_type
                } else {
                    self.types.char_type
                }
            }
            TokenKind::Long => {
                if unsigned {
                    self.types.unsigned_long_type
                } else {
                    self.types.long_type
                }
            }
            TokenKind::Float | TokenKind::Double => self.types.fp_type,
            TokenKind::Void => self.types.void_type,
            TokenKind::Struct => self.type_parse_struct(parser, true)?,
            TokenKind::Union => self.type_parse_struct(parser, false)?,
            TokenKind::Enum => self.type_parse_enum(parser)?,
            TokenKind::Ident(name) => {
                // only a typedef'd identifier can start a type
                match self.typedef_lookup(name) {
                    Some(typ) => typ,
                    None => {
                        parser.set_pos(before);
                        return Ok(None);
                    }
                }
            }
            _ => {
                parser.set_pos(before);
                return Ok(None);
            }
        };

        Ok(Some((typ, is_static)))
    }

    /// Whether a type could start at the current token: a type keyword, a
    /// storage qualifier, or a typedef'd identifier. Used to tell casts
    /// from grouping and declarations from expressions.
    pub(crate) fn starts_type(&self, parser: &ParserState) -> bool {
        match self.peek_kind(parser) {
            TokenKind::Int
            | TokenKind::Short
            | TokenKind::Char
            | TokenKind::Long
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Void
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum
            | TokenKind::Static
            | TokenKind::Auto
            | TokenKind::Register
            | TokenKind::Extern => true,
            TokenKind::Ident(name) => self.typedef_lookup(name).is_some(),
            _ => false,
        }
    }

    /// The value bound to `name`, when it is a typedef.
    pub(crate) fn typedef_lookup(&self, name: Symbol) -> Option<TypeId> {
        let value = self.variable_lookup(name)?;
        if value.typ == self.types.type_type {
            match value.slot {
                ValSlot::Ty(typ) => Some(typ),
                _ => None,
            }
        } else {
            None
        }
    }

    /// Parse the part of a declaration repeated for each identifier:
    /// parenthesized sub-declarators, `*` derivations, the identifier, and
    /// the trailing array bounds.
    pub(crate) fn type_parse_ident_part(
        &mut self,
        parser: &mut ParserState,
        basic: TypeId,
    ) -> Result<(TypeId, Symbol)> {
        let mut typ = basic;
        let mut identifier = Symbol::EMPTY;

        loop {
            let before = parser.pos();
            let token = self.get_token(parser);
            match token.kind {
                TokenKind::OpenParen => {
                    let (inner, inner_ident) = self.type_parse_ident_part(parser, typ)?;
                    self.expect(parser, TokenKind::CloseParen)?;
                    typ = inner;
                    identifier = inner_ident;
                    break;
                }
                TokenKind::Star => {
                    typ = self.types.pointer_to(typ);
                }
                TokenKind::Ident(name) => {
                    if identifier != Symbol::EMPTY {
                        return Err(self.syntax_error(parser, "bad type declaration"));
                    }
                    identifier = name;
                    break;
                }
                _ => {
                    parser.set_pos(before);
                    break;
                }
            }
        }

        if identifier != Symbol::EMPTY {
            typ = self.type_parse_back(parser, typ)?;
        }
        Ok((typ, identifier))
    }

    /// Parse array bounds after an identifier. A missing size makes an
    /// unsized array (size 0), resolved later from an initializer.
    pub(crate) fn type_parse_back(
        &mut self,
        parser: &mut ParserState,
        from: TypeId,
    ) -> Result<TypeId> {
        let before = parser.pos();
        if self.peek_kind(parser) != TokenKind::OpenBracket {
            parser.set_pos(before);
            return Ok(from);
        }
        self.get_token(parser);

        if self.accept(parser, TokenKind::CloseBracket) {
            let element = self.type_parse_back(parser, from)?;
            return Ok(self.types.array_of(element, 0));
        }

        // array sizes are evaluated even inside skipped code
        let old_mode = parser.mode;
        parser.mode = RunMode::Run;
        let size = self.expression_int(parser)?;
        parser.mode = old_mode;
        if size < 0 {
            return Err(self.syntax_error(parser, "array size must not be negative"));
        }
        self.expect(parser, TokenKind::CloseBracket)?;

        let element = self.type_parse_back(parser, from)?;
        Ok(self.types.array_of(element, size as usize))
    }

    /// Parse a complete declaration type including the identifier.
    pub(crate) fn type_parse(
        &mut self,
        parser: &mut ParserState,
    ) -> Result<Option<(TypeId, Symbol, bool)>> {
        let Some((basic, is_static)) = self.type_parse_front(parser)? else {
            return Ok(None);
        };
        let (typ, identifier) = self.type_parse_ident_part(parser, basic)?;
        Ok(Some((typ, identifier, is_static)))
    }

    /// Parse a struct or union declaration, returning the (possibly
    /// forward-declared) aggregate type.
    fn type_parse_struct(&mut self, parser: &mut ParserState, is_struct: bool) -> Result<TypeId> {
        let name = match self.peek_kind(parser) {
            TokenKind::Ident(name) => {
                self.get_token(parser);
                name
            }
            _ => self.make_temp_name('s'),
        };

        let base = if is_struct {
            BaseType::Struct
        } else {
            BaseType::Union
        };
        let typ = self.types.get_matching(self.types.uber, base, 0, name);

        if self.peek_kind(parser) != TokenKind::OpenBrace {
            // use the (possibly forward) declaration as-is
            return Ok(typ);
        }
        if self.types.node(typ).members.is_some() {
            let display = self.types.display(typ, &self.interner);
            return Err(self.type_error(parser, format!("data type '{}' is already defined", display)));
        }
        if !self.frames.is_empty() {
            return Err(self.type_error(parser, "struct/union definitions can only be globals"));
        }

        self.get_token(parser); // '{'
        let mut members = StructMembers::new();
        let mut sizeof = 0usize;
        let mut align = 1usize;

        loop {
            let Some((member_typ, member_ident, _)) = self.type_parse(parser)? else {
                return Err(self.type_error(parser, "invalid type in struct"));
            };
            if member_ident == Symbol::EMPTY {
                return Err(self.type_error(parser, "invalid type in struct"));
            }

            let member_node = self.types.node(member_typ);
            let member_align = member_node.align.max(1);
            let member_size = self.types.sizeof(member_typ, true);

            let offset = if is_struct {
                // round the aggregate up to this member's alignment
                let padded = (sizeof + member_align - 1) & !(member_align - 1);
                sizeof = padded + member_size;
                padded
            } else {
                // union members overlay at offset zero
                sizeof = sizeof.max(member_size);
                0
            };
            align = align.max(member_align);

            let decl = DeclSite {
                file: parser.file,
                line: parser.line,
                column: parser.column,
            };
            if !members.table.set(
                member_ident,
                Member {
                    typ: member_typ,
                    offset,
                },
                decl,
            ) {
                let ident = self.interner.resolve(member_ident).to_string();
                return Err(
                    self.type_error(parser, format!("member '{}' already defined", ident))
                );
            }
            members.order.push(member_ident);

            self.expect(parser, TokenKind::Semicolon)?;
            if self.peek_kind(parser) == TokenKind::CloseBrace {
                break;
            }
        }

        // round the aggregate up to its largest member's alignment
        sizeof = (sizeof + align - 1) & !(align - 1);
        self.get_token(parser); // '}'

        let node = self.types.node_mut(typ);
        node.members = Some(members);
        node.sizeof = sizeof;
        node.align = align;
        Ok(typ)
    }

    /// Parse an enum declaration. Enumerators are bound in the global table
    /// as integer constants; variables of the enum type are plain ints.
    fn type_parse_enum(&mut self, parser: &mut ParserState) -> Result<TypeId> {
        let name = match self.peek_kind(parser) {
            TokenKind::Ident(name) => {
                self.get_token(parser);
                name
            }
            _ => self.make_temp_name('e'),
        };

        let defining = self.peek_kind(parser) == TokenKind::OpenBrace;
        let existing = self
            .types
            .find_matching(self.types.uber, BaseType::Enum, 0, name);
        let typ = self
            .types
            .get_matching(self.types.uber, BaseType::Enum, 0, name);

        if !defining {
            if self.types.node(typ).members.is_none() {
                let ident = self.interner.resolve(name).to_string();
                return Err(self.type_error(parser, format!("enum '{}' isn't defined", ident)));
            }
            return Ok(self.types.int_type);
        }
        if existing.is_some() && self.types.node(typ).members.is_some() {
            let ident = self.interner.resolve(name).to_string();
            return Err(self.type_error(parser, format!("data type '{}' is already defined", ident)));
        }
        if !self.frames.is_empty() {
            return Err(self.type_error(parser, "enum definitions can only be globals"));
        }

        self.get_token(parser); // '{'
        let mut counter: i64 = 0;
        // one template value, deep-copied into each enumerator's binding
        let template = self.alloc_int_constant(parser, 0)?;
        loop {
            let token = self.get_token(parser);
            let TokenKind::Ident(enum_ident) = token.kind else {
                return Err(self.syntax_error(parser, "identifier expected"));
            };

            if self.accept(parser, TokenKind::Assign) {
                counter = self.expression_int(parser)?;
            }

            self.set_value_int(parser, &template, counter)?;
            self.variable_define(parser, enum_ident, Some(&template), None, false)?;

            counter += 1;
            let separator = self.get_token(parser);
            match separator.kind {
                TokenKind::Comma => {
                    if self.peek_kind(parser) == TokenKind::CloseBrace {
                        self.get_token(parser);
                        break;
                    }
                }
                TokenKind::CloseBrace => break,
                _ => return Err(self.syntax_error(parser, "comma expected")),
            }
        }

        // the member marker records that this enum is now defined
        self.types.node_mut(typ).members = Some(StructMembers::new());
        Ok(self.types.int_type)
    }
}
