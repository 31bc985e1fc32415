//! Statement parsing and execution
//!
//! The single-pass driver: statements take effect as their tokens are
//! consumed. Control flow works by switching the parser's run mode —
//! not-taken branches parse in Skip, `return`/`break`/`continue` unwind by
//! mode until an enclosing construct consumes them, `switch` scans in
//! CaseSearch, `goto` scans for its label — and by rewinding the token
//! cursor: loops re-parse their bodies from saved positions until the
//! condition goes false.

use tracing::debug;

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::expressions::Operand;
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::{ChunkId, ParserState, RunMode, TokenChunk};
use crate::interpreter::table::Symbol;
use crate::interpreter::types::{BaseType, TypeId};
use crate::interpreter::values::{FuncBody, FuncDef, MacroDef, MacroId, ValSlot, Value};
use crate::lexer::TokenKind;

/// What parsing one statement concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    Ok,
    Eof,
}

impl Interpreter {
    /// Parse and execute one statement, including its trailing semicolon
    /// where the grammar wants one.
    pub(crate) fn statement(&mut self, parser: &mut ParserState) -> Result<ParseOutcome> {
        if parser.debug {
            self.debug_check_statement(parser);
        }

        let before = parser.pos();
        let token = self.get_token(parser);
        let mut needs_semicolon = true;

        match token.kind {
            TokenKind::Eof => return Ok(ParseOutcome::Eof),
            TokenKind::EndOfLine | TokenKind::Semicolon => return Ok(ParseOutcome::Ok),

            TokenKind::Ident(name) => {
                if self.peek_kind(parser) == TokenKind::Colon {
                    // a goto label; consumes no semicolon
                    self.get_token(parser);
                    if parser.mode == RunMode::Goto && parser.search_goto == Some(name) {
                        parser.mode = RunMode::Run;
                        parser.search_goto = None;
                    }
                    return Ok(ParseOutcome::Ok);
                }
                parser.set_pos(before);
                if self.typedef_lookup(name).is_some() {
                    needs_semicolon = self.parse_declaration(parser)?;
                } else {
                    self.expression(parser)?;
                }
            }

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
            | TokenKind::Extern => {
                parser.set_pos(before);
                needs_semicolon = self.parse_declaration(parser)?;
            }

            TokenKind::Typedef => self.parse_typedef(parser)?,

            TokenKind::OpenBrace => {
                self.parse_block(parser, false, true)?;
                return Ok(ParseOutcome::Ok);
            }

            TokenKind::If => {
                self.expect(parser, TokenKind::OpenParen)?;
                let condition = self.expression_int(parser)? != 0;
                self.expect(parser, TokenKind::CloseParen)?;
                self.statement_maybe_run(parser, condition)?;
                if self.accept(parser, TokenKind::Else) {
                    self.statement_maybe_run(parser, !condition)?;
                }
                needs_semicolon = false;
            }

            TokenKind::While => {
                self.parse_while(parser)?;
                needs_semicolon = false;
            }

            TokenKind::Do => self.parse_do_while(parser)?,

            TokenKind::For => {
                self.parse_for(parser)?;
                needs_semicolon = false;
            }

            TokenKind::Switch => {
                self.parse_switch(parser)?;
                needs_semicolon = false;
            }

            TokenKind::Case => {
                let label = if parser.mode == RunMode::CaseSearch {
                    parser.mode = RunMode::Run;
                    let value = self.expression_int(parser)?;
                    parser.mode = RunMode::CaseSearch;
                    value
                } else {
                    self.expression_int(parser)?
                };
                self.expect(parser, TokenKind::Colon)?;
                if parser.mode == RunMode::CaseSearch && label == parser.search_label {
                    parser.mode = RunMode::Run;
                }
                needs_semicolon = false;
            }

            TokenKind::Default => {
                self.expect(parser, TokenKind::Colon)?;
                if parser.mode == RunMode::CaseSearch {
                    parser.mode = RunMode::Run;
                }
                needs_semicolon = false;
            }

            TokenKind::Break => {
                if parser.mode == RunMode::Run {
                    parser.mode = RunMode::Break;
                }
            }

            TokenKind::Continue => {
                if parser.mode == RunMode::Run {
                    parser.mode = RunMode::Continue;
                }
            }

            TokenKind::Return => self.parse_return(parser)?,

            TokenKind::Goto => {
                let target = self.get_token(parser);
                let TokenKind::Ident(label) = target.kind else {
                    return Err(self.syntax_error(parser, "goto label expected"));
                };
                if parser.mode == RunMode::Run {
                    parser.mode = RunMode::Goto;
                    parser.search_goto = Some(label);
                }
            }

            TokenKind::HashDefine => {
                self.parse_macro_definition(parser)?;
                needs_semicolon = false;
            }

            TokenKind::HashInclude => {
                let name_token = self.get_token(parser);
                let TokenKind::StrLit(name) = name_token.kind else {
                    return Err(self.syntax_error(parser, "include name expected"));
                };
                self.skip_to_eol(parser);
                self.include_by_symbol(parser, name)?;
                needs_semicolon = false;
            }

            TokenKind::HashIf => {
                parser.hash_if_level += 1;
                let condition = self.expression_int(parser)? != 0;
                self.skip_to_eol(parser);
                if !condition {
                    self.skip_conditional_section(parser, true)?;
                }
                needs_semicolon = false;
            }

            TokenKind::HashIfdef | TokenKind::HashIfndef => {
                parser.hash_if_level += 1;
                let ident_token = self.get_token(parser);
                let TokenKind::Ident(ident) = ident_token.kind else {
                    return Err(self.syntax_error(parser, "identifier expected"));
                };
                self.skip_to_eol(parser);
                let defined = self.variable_lookup(ident).is_some();
                let condition = if token.kind == TokenKind::HashIfdef {
                    defined
                } else {
                    !defined
                };
                if !condition {
                    self.skip_conditional_section(parser, true)?;
                }
                needs_semicolon = false;
            }

            TokenKind::HashElse => {
                // reached live: the taken branch just finished
                self.skip_to_eol(parser);
                self.skip_conditional_section(parser, false)?;
                needs_semicolon = false;
            }

            TokenKind::HashEndif => {
                parser.hash_if_level = parser.hash_if_level.saturating_sub(1);
                self.skip_to_eol(parser);
                needs_semicolon = false;
            }

            _ => {
                parser.set_pos(before);
                self.expression(parser)?;
            }
        }

        if needs_semicolon {
            self.expect(parser, TokenKind::Semicolon)?;
        }
        Ok(ParseOutcome::Ok)
    }

    /// Parse one statement, forcing Skip mode when `run_it` is false.
    pub(crate) fn statement_maybe_run(
        &mut self,
        parser: &mut ParserState,
        run_it: bool,
    ) -> Result<ParseOutcome> {
        if parser.mode != RunMode::Skip && !run_it {
            let old_mode = parser.mode;
            parser.mode = RunMode::Skip;
            let outcome = self.statement(parser);
            parser.mode = old_mode;
            outcome
        } else {
            self.statement(parser)
        }
    }

    /// Parse a `{ ... }` block with its own scope. When `condition` is
    /// false the whole block parses in Skip mode.
    pub(crate) fn parse_block(
        &mut self,
        parser: &mut ParserState,
        absorb_open_brace: bool,
        condition: bool,
    ) -> Result<()> {
        if absorb_open_brace {
            self.expect(parser, TokenKind::OpenBrace)?;
        }

        let (scope, prev_scope) = self.scope_begin(parser);

        let old_mode = parser.mode;
        if !condition && parser.mode != RunMode::Skip {
            parser.mode = RunMode::Skip;
        }
        let mut result = Ok(());
        while self.peek_kind(parser) != TokenKind::CloseBrace {
            match self.statement(parser) {
                Ok(ParseOutcome::Ok) => {}
                Ok(ParseOutcome::Eof) => {
                    result = Err(self.syntax_error(parser, "'}' expected"));
                    break;
                }
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        if !condition {
            parser.mode = old_mode;
        }

        self.scope_end(parser, scope, prev_scope);
        result?;
        self.expect(parser, TokenKind::CloseBrace)?;
        Ok(())
    }

    // === loops and switch ===

    fn parse_while(&mut self, parser: &mut ParserState) -> Result<()> {
        let pre_mode = parser.mode;
        self.expect(parser, TokenKind::OpenParen)?;
        let pre_conditional = parser.pos();

        loop {
            parser.set_pos(pre_conditional);
            let condition = self.expression_int(parser)? != 0;
            self.expect(parser, TokenKind::CloseParen)?;

            self.statement_maybe_run(parser, condition)?;
            if parser.mode == RunMode::Continue {
                parser.mode = pre_mode;
            }

            if !(parser.mode == RunMode::Run && condition) {
                break;
            }
        }
        if parser.mode == RunMode::Break {
            parser.mode = pre_mode;
        }
        Ok(())
    }

    fn parse_do_while(&mut self, parser: &mut ParserState) -> Result<()> {
        let pre_mode = parser.mode;
        let pre_statement = parser.pos();

        loop {
            parser.set_pos(pre_statement);
            self.statement(parser)?;
            if parser.mode == RunMode::Continue {
                parser.mode = pre_mode;
            }

            self.expect(parser, TokenKind::While)?;
            self.expect(parser, TokenKind::OpenParen)?;
            let condition = self.expression_int(parser)? != 0;
            self.expect(parser, TokenKind::CloseParen)?;

            if !(condition && parser.mode == RunMode::Run) {
                break;
            }
        }
        if parser.mode == RunMode::Break {
            parser.mode = pre_mode;
        }
        Ok(())
    }

    fn parse_for(&mut self, parser: &mut ParserState) -> Result<()> {
        let pre_mode = parser.mode;
        let (scope, prev_scope) = self.scope_begin(parser);

        self.expect(parser, TokenKind::OpenParen)?;
        self.statement(parser)?; // the init statement eats its own ';'

        let pre_conditional = parser.pos();
        let mut condition = if self.peek_kind(parser) == TokenKind::Semicolon {
            true
        } else {
            self.expression_int(parser)? != 0
        };
        self.expect(parser, TokenKind::Semicolon)?;

        let pre_increment = parser.pos();
        if self.peek_kind(parser) != TokenKind::CloseParen {
            // position past the increment without running it yet
            let old_mode = parser.mode;
            parser.mode = RunMode::Skip;
            self.expression(parser)?;
            parser.mode = old_mode;
        }
        self.expect(parser, TokenKind::CloseParen)?;

        let pre_statement = parser.pos();
        self.statement_maybe_run(parser, condition)?;
        let after = parser.pos();
        if parser.mode == RunMode::Continue {
            parser.mode = pre_mode;
        }

        while condition && parser.mode == RunMode::Run {
            parser.set_pos(pre_increment);
            if self.peek_kind(parser) != TokenKind::CloseParen {
                self.expression(parser)?;
            }

            parser.set_pos(pre_conditional);
            condition = if self.peek_kind(parser) == TokenKind::Semicolon {
                true
            } else {
                self.expression_int(parser)? != 0
            };

            if condition {
                parser.set_pos(pre_statement);
                self.statement_maybe_run(parser, true)?;
                if parser.mode == RunMode::Continue {
                    parser.mode = pre_mode;
                }
            }
        }
        if parser.mode == RunMode::Break {
            parser.mode = pre_mode;
        }

        parser.set_pos(after);
        self.scope_end(parser, scope, prev_scope);
        Ok(())
    }

    fn parse_switch(&mut self, parser: &mut ParserState) -> Result<()> {
        self.expect(parser, TokenKind::OpenParen)?;
        let subject = self.expression_int(parser)?;
        self.expect(parser, TokenKind::CloseParen)?;

        if self.peek_kind(parser) != TokenKind::OpenBrace {
            return Err(self.syntax_error(parser, "block expected"));
        }

        let old_mode = parser.mode;
        let old_search_label = parser.search_label;
        if parser.mode == RunMode::Run {
            parser.mode = RunMode::CaseSearch;
            parser.search_label = subject;
        }

        self.parse_block(parser, true, old_mode != RunMode::Skip)?;

        if parser.mode == RunMode::Break || parser.mode == RunMode::CaseSearch {
            parser.mode = old_mode;
        }
        parser.search_label = old_search_label;
        Ok(())
    }

    fn parse_return(&mut self, parser: &mut ParserState) -> Result<()> {
        let has_expression = self.peek_kind(parser) != TokenKind::Semicolon;

        if parser.mode != RunMode::Run {
            if has_expression {
                self.expression(parser)?;
            }
            return Ok(());
        }

        let Some(frame) = self.frames.last() else {
            return Err(self.syntax_error(parser, "'return' is only allowed inside a function"));
        };
        let return_slot = frame.return_slot.clone();

        if has_expression {
            let result = self.expression(parser)?;
            if self.types.base(return_slot.typ) == BaseType::Void {
                return Err(self.type_error(parser, "void function returning a value"));
            }
            let dest = Operand::slot(
                return_slot.typ,
                return_slot
                    .address()
                    .expect("return slots live in the arena"),
                true,
            );
            self.assign_operand(parser, &dest, &result, true)?;
        }
        parser.mode = RunMode::Return;
        Ok(())
    }

    // === preprocessor ===

    pub(crate) fn skip_to_eol(&self, parser: &mut ParserState) {
        loop {
            match self.peek_kind(parser) {
                TokenKind::EndOfLine => {
                    self.get_token(parser);
                    return;
                }
                TokenKind::Eof => return,
                _ => {
                    self.get_token(parser);
                }
            }
        }
    }

    /// Skip a suppressed conditional section: everything up to the matching
    /// `#endif`, or — when `stop_at_else` — a matching-level `#else`.
    fn skip_conditional_section(
        &mut self,
        parser: &mut ParserState,
        stop_at_else: bool,
    ) -> Result<()> {
        let mut depth = 0u32;
        loop {
            let token = self.get_token(parser);
            match token.kind {
                TokenKind::Eof => {
                    return Err(self.syntax_error(parser, "'#endif' expected"));
                }
                TokenKind::HashIf | TokenKind::HashIfdef | TokenKind::HashIfndef => depth += 1,
                TokenKind::HashElse if depth == 0 && stop_at_else => {
                    self.skip_to_eol(parser);
                    return Ok(());
                }
                TokenKind::HashEndif => {
                    if depth == 0 {
                        parser.hash_if_level = parser.hash_if_level.saturating_sub(1);
                        self.skip_to_eol(parser);
                        return Ok(());
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
    }

    /// `#define NAME body` or `#define NAME(params) body`; the body tokens
    /// are copied into their own chunk, owned by the macro.
    fn parse_macro_definition(&mut self, parser: &mut ParserState) -> Result<()> {
        let name_token = self.get_token(parser);
        let TokenKind::Ident(name) = name_token.kind else {
            return Err(self.syntax_error(parser, "identifier expected"));
        };

        let params = if self.looks_like_macro_params(parser) {
            self.get_token(parser); // '('
            let mut params = Vec::new();
            if self.peek_kind(parser) != TokenKind::CloseParen {
                loop {
                    let param = self.get_token(parser);
                    let TokenKind::Ident(param_name) = param.kind else {
                        return Err(self.syntax_error(parser, "identifier expected"));
                    };
                    params.push(param_name);
                    if !self.accept(parser, TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(parser, TokenKind::CloseParen)?;
            Some(params)
        } else {
            None
        };

        // copy the body through end of line into the macro's own chunk
        let mut body_tokens = Vec::new();
        loop {
            match self.peek_kind(parser) {
                TokenKind::EndOfLine => {
                    self.get_token(parser);
                    break;
                }
                TokenKind::Eof => break,
                _ => {
                    let chunk = &self.chunks[parser.chunk.0 as usize];
                    body_tokens.push(chunk.tokens[parser.cursor].clone());
                    self.get_token(parser);
                }
            }
        }
        body_tokens.push(crate::lexer::Token {
            kind: TokenKind::Eof,
            span: crate::lexer::Span::new(parser.line, parser.column),
        });

        // re-running the same definition is idempotent
        let table = match self.frames.last() {
            Some(frame) => &frame.locals,
            None => &self.globals,
        };
        if let Some(entry) = table.live.get(name) {
            let same_site = entry.decl.file == parser.file
                && entry.decl.line == name_token.span.line
                && entry.decl.column == name_token.span.column;
            if same_site {
                return Ok(());
            }
        }

        let body_chunk = self.add_chunk(TokenChunk {
            file: parser.file,
            tokens: body_tokens,
            source: None,
        });
        let macro_id = MacroId(self.macros.len() as u32);
        self.macros.push(MacroDef {
            params,
            body: body_chunk,
        });

        let value = Value::new(
            self.types.macro_type,
            ValSlot::Mac(macro_id),
            false,
            crate::interpreter::variables::ScopeId::GLOBAL,
        );
        self.variable_bind(parser, name, value)?;
        debug!(name = self.interner.resolve(name), "defined macro");
        Ok(())
    }

    /// Distinguish `#define F(a, b) ...` from `#define X (expr)`: only a
    /// parenthesized list of bare identifiers counts as a parameter list.
    fn looks_like_macro_params(&self, parser: &ParserState) -> bool {
        if self.peek_kind(parser) != TokenKind::OpenParen {
            return false;
        }
        let chunk = &self.chunks[parser.chunk.0 as usize];
        let mut cursor = parser.cursor + 1;
        let mut expecting_ident = true;
        loop {
            match chunk.tokens.get(cursor).map(|token| &token.kind) {
                Some(TokenKind::CloseParen) => return true,
                Some(TokenKind::Ident(_)) if expecting_ident => expecting_ident = false,
                Some(TokenKind::Comma) if !expecting_ident => expecting_ident = true,
                _ => return false,
            }
            cursor += 1;
        }
    }

    // === declarations ===

    /// `typedef <type> <name>;` binds a value whose payload is the type.
    fn parse_typedef(&mut self, parser: &mut ParserState) -> Result<()> {
        let Some((typ, ident, _)) = self.type_parse(parser)? else {
            return Err(self.syntax_error(parser, "invalid type in typedef"));
        };
        if ident == Symbol::EMPTY {
            return Err(self.syntax_error(parser, "typedef name expected"));
        }
        if parser.mode != RunMode::Run {
            return Ok(());
        }

        // same-site re-execution is idempotent, like variable declarations
        let table = match self.frames.last() {
            Some(frame) => &frame.locals,
            None => &self.globals,
        };
        if let Some(entry) = table.live.get(ident) {
            if entry.decl.file == parser.file && entry.decl.line == parser.line {
                return Ok(());
            }
        }

        let value = Value::new(
            self.types.type_type,
            ValSlot::Ty(typ),
            false,
            parser.scope_id,
        );
        self.variable_bind(parser, ident, value)?;
        Ok(())
    }

    /// Parse a declaration statement: one type front, then a comma list of
    /// declarators, each optionally initialized. Returns whether the caller
    /// still owes a trailing semicolon (function definitions consume their
    /// own body instead).
    pub(crate) fn parse_declaration(&mut self, parser: &mut ParserState) -> Result<bool> {
        let Some((basic, is_static)) = self.type_parse_front(parser)? else {
            return Err(self.syntax_error(parser, "bad type declaration"));
        };

        loop {
            let (typ, ident) = self.type_parse_ident_part(parser, basic)?;

            if ident == Symbol::EMPTY {
                // a bare struct/union/enum declaration, no variable
                return Ok(true);
            }

            if self.peek_kind(parser) == TokenKind::OpenParen {
                self.parse_function_definition(parser, typ, ident)?;
                return Ok(false);
            }

            if self.types.base(typ) == BaseType::Void {
                return Err(self.type_error(parser, "can't declare a void variable"));
            }

            let defined = if parser.mode == RunMode::Run {
                Some(self.variable_define_but_ignore_identical(parser, ident, typ, is_static)?)
            } else {
                None
            };

            if self.accept(parser, TokenKind::Assign) {
                match defined {
                    Some((value, first_visit)) => {
                        // static initializers run only on the first visit
                        let run_init = !is_static || first_visit;
                        if run_init {
                            self.parse_declaration_assignment(parser, ident, value)?;
                        } else {
                            let old_mode = parser.mode;
                            parser.mode = RunMode::Skip;
                            self.parse_declaration_assignment_skip(parser)?;
                            parser.mode = old_mode;
                        }
                    }
                    None => self.parse_declaration_assignment_skip(parser)?,
                }
            }

            if !self.accept(parser, TokenKind::Comma) {
                return Ok(true);
            }
        }
    }

    /// Consume an initializer without running it.
    fn parse_declaration_assignment_skip(&mut self, parser: &mut ParserState) -> Result<()> {
        if self.peek_kind(parser) == TokenKind::OpenBrace {
            self.get_token(parser);
            let mut depth = 1;
            while depth > 0 {
                match self.get_token(parser).kind {
                    TokenKind::OpenBrace => depth += 1,
                    TokenKind::CloseBrace => depth -= 1,
                    TokenKind::Eof => {
                        return Err(self.syntax_error(parser, "'}' expected"));
                    }
                    _ => {}
                }
            }
        } else {
            self.expression(parser)?;
        }
        Ok(())
    }

    /// Run a declaration's initializer into the freshly defined value.
    fn parse_declaration_assignment(
        &mut self,
        parser: &mut ParserState,
        ident: Symbol,
        mut value: Value,
    ) -> Result<()> {
        if self.peek_kind(parser) == TokenKind::OpenBrace {
            return self.parse_array_initializer(parser, Some(ident), &mut value);
        }

        let init = self.expression(parser)?;
        if parser.mode != RunMode::Run {
            return Ok(());
        }

        // `char buf[] = "text"` sizes the array from the literal
        let node = self.types.node(value.typ);
        if node.base == BaseType::Array && node.array_size == 0 {
            if self.types.base(init.typ) != BaseType::Array {
                return Err(self.type_error(parser, "array initializer expected"));
            }
            let new_size = self.types.sizeof(init.typ, true);
            self.value_realloc(parser, &mut value, new_size)?;
            value.typ = init.typ;
            self.update_binding(ident, &value);
        }

        let dest = Operand::slot(
            value.typ,
            value.address().expect("declared values live in the arena"),
            true,
        );
        self.assign_operand(parser, &dest, &init, true)
    }

    /// `= { e0, e1, ... }` for arrays; unsized arrays take their size from
    /// the element count.
    fn parse_array_initializer(
        &mut self,
        parser: &mut ParserState,
        ident: Option<Symbol>,
        value: &mut Value,
    ) -> Result<()> {
        if self.types.base(value.typ) != BaseType::Array {
            return Err(self.type_error(parser, "this type can't take a brace initializer"));
        }

        // count top-level elements first so an unsized array can be sized
        let start = parser.pos();
        let count = self.count_initializer_elements(parser)?;
        parser.set_pos(start);

        let node = self.types.node(value.typ);
        let element = node.from.expect("array types always have an element");
        if node.array_size == 0 {
            // only the outermost dimension may take its size from the list
            if ident.is_none() {
                return Err(
                    self.type_error(parser, "inner array dimensions need an explicit size")
                );
            }
            let sized = self.types.array_of(element, count);
            let new_size = self.types.sizeof(sized, true);
            self.value_realloc(parser, value, new_size)?;
            value.typ = sized;
            if let Some(ident) = ident {
                self.update_binding(ident, value);
            }
        } else if count > node.array_size {
            return Err(self.type_error(
                parser,
                format!(
                    "too many initializers: {} for an array of {}",
                    count, node.array_size
                ),
            ));
        }

        let element_size = self.types.sizeof(element, true).max(1);
        let base_addr = value.address().expect("arrays live in the arena");

        self.expect(parser, TokenKind::OpenBrace)?;
        let mut index = 0usize;
        if self.peek_kind(parser) != TokenKind::CloseBrace {
            loop {
                let element_addr = base_addr + (index * element_size) as u64;
                if self.peek_kind(parser) == TokenKind::OpenBrace {
                    // nested initializer for an array-of-arrays element
                    let mut element_value = Value::new(
                        element,
                        ValSlot::Arena(element_addr),
                        true,
                        parser.scope_id,
                    );
                    self.parse_array_initializer(parser, None, &mut element_value)?;
                } else {
                    let init = self.expression(parser)?;
                    let dest = Operand::slot(element, element_addr, true);
                    self.assign_operand(parser, &dest, &init, true)?;
                }
                index += 1;
                if !self.accept(parser, TokenKind::Comma) {
                    break;
                }
                if self.peek_kind(parser) == TokenKind::CloseBrace {
                    break; // trailing comma
                }
            }
        }
        self.expect(parser, TokenKind::CloseBrace)?;
        Ok(())
    }

    /// Count top-level elements of a brace initializer without running it.
    fn count_initializer_elements(&mut self, parser: &mut ParserState) -> Result<usize> {
        self.expect(parser, TokenKind::OpenBrace)?;
        if self.peek_kind(parser) == TokenKind::CloseBrace {
            self.get_token(parser);
            return Ok(0);
        }
        let mut count = 1usize;
        let mut depth = 0u32;
        loop {
            match self.get_token(parser).kind {
                TokenKind::OpenBrace | TokenKind::OpenParen | TokenKind::OpenBracket => depth += 1,
                TokenKind::CloseParen | TokenKind::CloseBracket => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::CloseBrace => {
                    if depth == 0 {
                        return Ok(count);
                    }
                    depth -= 1;
                }
                TokenKind::Comma if depth == 0 => {
                    if self.peek_kind(parser) == TokenKind::CloseBrace {
                        // trailing comma
                        continue;
                    }
                    count += 1;
                }
                TokenKind::Eof => {
                    return Err(self.syntax_error(parser, "'}' expected"));
                }
                _ => {}
            }
        }
    }

    /// After an unsized array's type/payload change, refresh the table's
    /// copy of its header.
    fn update_binding(&mut self, ident: Symbol, value: &Value) {
        let table = match self.frames.last_mut() {
            Some(frame) => &mut frame.locals,
            None => &mut self.globals,
        };
        if let Some(entry) = table.live.get_mut(ident) {
            entry.value.typ = value.typ;
            entry.value.slot = value.slot.clone();
        }
    }

    // === functions ===

    /// Parse a function prototype or definition after its return type and
    /// name. A body is copied into its own token chunk and saved, not run.
    fn parse_function_definition(
        &mut self,
        parser: &mut ParserState,
        ret_type: TypeId,
        ident: Symbol,
    ) -> Result<()> {
        self.expect(parser, TokenKind::OpenParen)?;

        let mut params: Vec<(Symbol, TypeId)> = Vec::new();
        let mut varargs = false;
        if self.peek_kind(parser) != TokenKind::CloseParen {
            loop {
                if self.accept(parser, TokenKind::Ellipsis) {
                    varargs = true;
                    break;
                }
                let Some((param_typ, param_ident, _)) = self.type_parse(parser)? else {
                    return Err(self.syntax_error(parser, "invalid parameter"));
                };
                // f(void) takes no parameters
                if self.types.base(param_typ) == BaseType::Void
                    && param_ident == Symbol::EMPTY
                    && params.is_empty()
                {
                    break;
                }
                params.push((param_ident, param_typ));
                if !self.accept(parser, TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(parser, TokenKind::CloseParen)?;

        let has_body = self.peek_kind(parser) == TokenKind::OpenBrace;
        if has_body && !self.frames.is_empty() {
            return Err(self.syntax_error(parser, "functions can only be defined at the top level"));
        }

        let body = if has_body {
            Some(self.copy_body_tokens(parser)?)
        } else {
            None
        };

        let def = FuncDef {
            ret_type,
            params,
            varargs,
            body: match body {
                Some(chunk) => FuncBody::Tokens(chunk),
                None => FuncBody::Forward,
            },
        };

        match self.globals.live.get(ident).map(|entry| entry.value.clone()) {
            None => {
                let func_id = crate::interpreter::values::FuncId(self.functions.len() as u32);
                self.functions.push(def);
                let value = Value::new(
                    self.types.function_type,
                    ValSlot::Func(func_id),
                    false,
                    crate::interpreter::variables::ScopeId::GLOBAL,
                );
                // functions always live in the global table
                let frames_empty = self.frames.is_empty();
                if frames_empty {
                    self.variable_bind(parser, ident, value)?;
                } else {
                    let decl = crate::interpreter::table::DeclSite {
                        file: parser.file,
                        line: parser.line,
                        column: parser.column,
                    };
                    self.globals.live.set(ident, value, decl);
                }
            }
            Some(existing) => {
                let ValSlot::Func(func_id) = existing.slot else {
                    return Err(InterpError::AlreadyDefined {
                        name: self.interner.resolve(ident).to_string(),
                        location: self.location(parser),
                    });
                };
                let existing_forward = matches!(
                    self.functions[func_id.0 as usize].body,
                    FuncBody::Forward
                );
                let incoming_forward = matches!(def.body, FuncBody::Forward);
                if existing_forward {
                    // a definition fills in an earlier prototype
                    self.functions[func_id.0 as usize] = def;
                } else if !incoming_forward {
                    return Err(InterpError::AlreadyDefined {
                        name: self.interner.resolve(ident).to_string(),
                        location: self.location(parser),
                    });
                }
                // repeated prototypes are harmless
            }
        }

        debug!(
            function = self.interner.resolve(ident),
            body = has_body,
            "declared function"
        );
        Ok(())
    }

    /// Copy a balanced `{ ... }` token range into a fresh chunk owned by
    /// the function, advancing the cursor past the body.
    fn copy_body_tokens(&mut self, parser: &mut ParserState) -> Result<ChunkId> {
        let chunk_index = parser.chunk.0 as usize;
        let start = parser.cursor;
        let mut depth = 0usize;
        let mut end = start;
        loop {
            let Some(token) = self.chunks[chunk_index].tokens.get(end) else {
                return Err(self.syntax_error(parser, "'}' expected"));
            };
            match token.kind {
                TokenKind::OpenBrace => depth += 1,
                TokenKind::CloseBrace => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Eof => {
                    return Err(self.syntax_error(parser, "'}' expected"));
                }
                _ => {}
            }
            end += 1;
        }

        let mut tokens = self.chunks[chunk_index].tokens[start..=end].to_vec();
        tokens.push(crate::lexer::Token {
            kind: TokenKind::Eof,
            span: crate::lexer::Span::new(parser.line, parser.column),
        });
        let file = self.chunks[chunk_index].file;
        let body = self.add_chunk(TokenChunk {
            file,
            tokens,
            source: None,
        });

        // advance past the body in the defining stream
        while parser.cursor <= end {
            self.get_token(parser);
        }
        Ok(body)
    }
}
