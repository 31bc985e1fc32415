//! Parser state and token access
//!
//! The parse-execute core never builds a syntax tree: a [`ParserState`] is a
//! cheap-to-copy cursor into a lexed token chunk plus the run mode and
//! search state that drive execution. Loops re-run their bodies by saving a
//! [`ParserPos`] and rewinding the cursor; function bodies are entered by
//! cloning the body's stored parser state.

use crate::interpreter::instance::Interpreter;
use crate::interpreter::table::Symbol;
use crate::interpreter::variables::ScopeId;
use crate::lexer::{Token, TokenKind};

/// Handle to a lexed token buffer owned by the interpreter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkId(pub u32);

/// A token chunk: the tokens of one `parse` call, one function body, or one
/// macro body, plus the retained source text for diagnostics.
#[derive(Debug, Default)]
pub struct TokenChunk {
    pub file: Symbol,
    pub tokens: Vec<Token>,
    pub source: Option<String>,
}

/// Whether we're running or skipping code as we parse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Execute statements as they are parsed
    Run,
    /// Parse without executing (not-taken branch, dead code)
    Skip,
    /// Unwinding to the nearest function boundary
    Return,
    /// Scanning a switch body for a matching case label
    CaseSearch,
    /// Unwinding to the end of the enclosing loop or switch
    Break,
    /// Unwinding to the enclosing loop's increment and test
    Continue,
    /// Scanning for a goto label
    Goto,
}

/// A saved position inside a chunk, for loop rewinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserPos {
    pub cursor: usize,
    pub line: u32,
    pub column: u32,
}

/// The complete state of one parse-execute cursor. Copied freely: saving
/// and restoring parser state is how loops, short-circuit evaluation, and
/// function calls rewind the token stream.
#[derive(Debug, Clone)]
pub struct ParserState {
    pub chunk: ChunkId,
    pub cursor: usize,
    pub file: Symbol,
    pub line: u32,
    pub column: u32,
    pub mode: RunMode,
    /// The value a surrounding `switch` is searching a `case` for.
    pub search_label: i64,
    /// The label a `goto` is searching for.
    pub search_goto: Option<Symbol>,
    /// Nesting depth of preprocessor conditionals.
    pub hash_if_level: u16,
    /// The level conditionals are being evaluated down to; deeper levels
    /// are skipped.
    pub hash_if_evaluate_to_level: u16,
    pub debug: bool,
    pub scope_id: ScopeId,
}

impl ParserState {
    pub fn new(chunk: ChunkId, file: Symbol, run: bool, debug: bool) -> Self {
        ParserState {
            chunk,
            cursor: 0,
            file,
            line: 1,
            column: 1,
            mode: if run { RunMode::Run } else { RunMode::Skip },
            search_label: 0,
            search_goto: None,
            hash_if_level: 0,
            hash_if_evaluate_to_level: 0,
            debug,
            scope_id: ScopeId::GLOBAL,
        }
    }

    pub fn pos(&self) -> ParserPos {
        ParserPos {
            cursor: self.cursor,
            line: self.line,
            column: self.column,
        }
    }

    pub fn set_pos(&mut self, pos: ParserPos) {
        self.cursor = pos.cursor;
        self.line = pos.line;
        self.column = pos.column;
    }
}

impl Interpreter {
    /// Consume and return the current token, advancing the cursor.
    pub(crate) fn get_token(&self, parser: &mut ParserState) -> Token {
        let chunk = &self.chunks[parser.chunk.0 as usize];
        let token = chunk
            .tokens
            .get(parser.cursor)
            .cloned()
            .unwrap_or_else(|| Token {
                kind: TokenKind::Eof,
                span: crate::lexer::Span::new(parser.line, parser.column),
            });
        parser.line = token.span.line;
        parser.column = token.span.column;
        if token.kind != TokenKind::Eof {
            parser.cursor += 1;
        }
        token
    }

    /// Look at the current token without consuming it.
    pub(crate) fn peek_kind(&self, parser: &ParserState) -> TokenKind {
        let chunk = &self.chunks[parser.chunk.0 as usize];
        chunk
            .tokens
            .get(parser.cursor)
            .map(|token| token.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    /// Consume the current token if it matches, returning whether it did.
    pub(crate) fn accept(&self, parser: &mut ParserState, kind: TokenKind) -> bool {
        if self.peek_kind(parser) == kind {
            self.get_token(parser);
            true
        } else {
            false
        }
    }

    /// Consume the current token, failing with a syntax error when it is
    /// not the expected one.
    pub(crate) fn expect(
        &self,
        parser: &mut ParserState,
        kind: TokenKind,
    ) -> crate::interpreter::errors::Result<()> {
        let token = self.get_token(parser);
        if token.kind == kind {
            Ok(())
        } else {
            Err(self.syntax_error(parser, format!("{} expected", kind)))
        }
    }
}
