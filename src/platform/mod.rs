//! Platform surface: host I/O, entry points, and the C library shims
//!
//! This is everything the embedder touches. Host I/O goes through the
//! [`HostIo`] trait so the CLI, tests, and embedding applications can each
//! supply their own console. The entry points drive the core: [`parse`]
//! for a source buffer, [`parse_interactive`] for a read-eval-print loop,
//! [`scan_file`] for a file on disk, and [`call_main`] to run a scripted
//! `main` with arguments.
//!
//! [`parse`]: crate::interpreter::Interpreter::parse
//! [`parse_interactive`]: crate::interpreter::Interpreter::parse_interactive
//! [`scan_file`]: crate::interpreter::Interpreter::scan_file
//! [`call_main`]: crate::interpreter::Interpreter::call_main

pub mod cctype;
pub mod cerrno;
pub mod cmath;
pub mod cstdbool;
pub mod cstdlib;
pub mod cstring;
pub mod ctime;
pub mod cunistd;
pub mod library;
pub mod stdio;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, Read, Write};
use std::rc::Rc;

use tracing::debug;

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::expressions::Operand;
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::{ParserState, TokenChunk};
use crate::interpreter::statements::ParseOutcome;
use crate::interpreter::values::Scalar;
use crate::lexer::{Lexer, TokenKind};

const PROMPT_STATEMENT: &str = "minic> ";
const PROMPT_LINE: &str = "     > ";

/// The console the interpreter runs against.
pub trait HostIo {
    /// Write program output.
    fn put(&mut self, text: &str);
    /// Read one line, prompting when interactive. `None` means end of
    /// input.
    fn get_line(&mut self, prompt: &str) -> Option<String>;
    /// Read one byte of input. `None` means end of input.
    fn get_char(&mut self) -> Option<u8>;
}

/// Real stdin/stdout.
#[derive(Default)]
pub struct StdHostIo;

impl HostIo for StdHostIo {
    fn put(&mut self, text: &str) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn get_line(&mut self, prompt: &str) -> Option<String> {
        if !prompt.is_empty() {
            self.put(prompt);
        }
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }

    fn get_char(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match std::io::stdin().lock().read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }
}

/// Captures output and replays scripted input; the test console.
pub struct CaptureIo {
    output: Rc<RefCell<String>>,
    input: VecDeque<String>,
}

impl CaptureIo {
    /// Returns the console and a handle to read what the program printed.
    pub fn new() -> (Self, Rc<RefCell<String>>) {
        let output = Rc::new(RefCell::new(String::new()));
        (
            CaptureIo {
                output: output.clone(),
                input: VecDeque::new(),
            },
            output,
        )
    }

    /// Queue a line of scripted input.
    pub fn push_input(&mut self, line: impl Into<String>) {
        self.input.push_back(line.into());
    }
}

impl HostIo for CaptureIo {
    fn put(&mut self, text: &str) {
        self.output.borrow_mut().push_str(text);
    }

    fn get_line(&mut self, _prompt: &str) -> Option<String> {
        self.input.pop_front()
    }

    fn get_char(&mut self) -> Option<u8> {
        let line = self.input.front_mut()?;
        if line.is_empty() {
            self.input.pop_front();
            return self.get_char();
        }
        let byte = line.as_bytes()[0];
        line.drain(..1);
        Some(byte)
    }
}

/// Register the stock C library bundles on a fresh instance.
pub fn register_standard_libraries(instance: &mut Interpreter) {
    // the startup chunk backs synthetic parsers (setup callbacks, call_main)
    if instance.chunks.is_empty() {
        let file = instance.interner.register("startup");
        instance.add_chunk(TokenChunk {
            file,
            tokens: vec![crate::lexer::Token {
                kind: TokenKind::Eof,
                span: crate::lexer::Span::new(0, 0),
            }],
            source: None,
        });
    }

    instance.register_library(stdio::bundle());
    instance.register_library(cstring::bundle());
    instance.register_library(cstdlib::bundle());
    instance.register_library(cmath::bundle());
    instance.register_library(ctime::bundle());
    instance.register_library(cerrno::bundle());
    instance.register_library(cctype::bundle());
    instance.register_library(cstdbool::bundle());
    instance.register_library(cunistd::bundle());
}

impl Interpreter {
    /// A parser over the built-in startup chunk, for host-initiated work
    /// that has no source position of its own.
    pub(crate) fn startup_parser(&self) -> ParserState {
        let file = self.chunks[0].file;
        ParserState::new(crate::interpreter::parser::ChunkId(0), file, true, false)
    }

    /// Lex and parse-execute a source buffer. `run` executes statements as
    /// they parse; false only checks them. `cleanup_now` releases the token
    /// buffer at the end instead of at interpreter teardown. The scripted
    /// program's `exit` ends the run without an error.
    pub fn parse(
        &mut self,
        file_name: &str,
        source: &str,
        run: bool,
        cleanup_now: bool,
        debug_mode: bool,
    ) -> Result<()> {
        let file = self.interner.register(file_name);
        let tokens = Lexer::new(source)
            .tokenize(&mut self.interner)
            .map_err(|error| InterpError::Lex {
                message: error.message,
                location: crate::interpreter::SourceLocation::new(
                    file_name,
                    error.span.line,
                    error.span.column,
                ),
            })?;
        let chunk = self.add_chunk(TokenChunk {
            file,
            tokens,
            source: Some(source.to_string()),
        });

        let mut parser = ParserState::new(chunk, file, run, debug_mode);
        let result = loop {
            match self.statement(&mut parser) {
                Ok(ParseOutcome::Eof) => {
                    if parser.mode == crate::interpreter::parser::RunMode::Goto {
                        let label = parser
                            .search_goto
                            .map(|symbol| self.interner.resolve(symbol).to_string())
                            .unwrap_or_default();
                        break Err(self.syntax_error(
                            &parser,
                            format!("goto label '{}' wasn't found", label),
                        ));
                    }
                    break Ok(());
                }
                Ok(ParseOutcome::Ok) => {}
                Err(error) => break Err(error),
            }
        };

        if cleanup_now {
            self.release_chunk(chunk);
        }

        match result {
            Err(InterpError::Exit { value }) => {
                self.exit_value = value;
                Ok(())
            }
            other => other,
        }
    }

    /// Read a source file and parse-execute it.
    pub fn scan_file(&mut self, path: &str) -> Result<()> {
        let source = std::fs::read_to_string(path).map_err(|error| InterpError::Host {
            message: format!("can't read '{}': {}", path, error),
        })?;
        debug!(path, bytes = source.len(), "scanning file");
        self.parse(path, &source, true, false, false)
    }

    /// Read-eval-print loop over the host line input. Statements are
    /// collected until their braces balance and execute one at a time;
    /// errors are reported and the loop continues.
    pub fn parse_interactive(&mut self) -> Result<()> {
        self.write_text(&format!("starting minic v{}\n", env!("CARGO_PKG_VERSION")));
        let mut buffer = String::new();
        loop {
            let prompt = if buffer.is_empty() {
                PROMPT_STATEMENT
            } else {
                PROMPT_LINE
            };
            let Some(line) = self.io.get_line(prompt) else {
                return Ok(());
            };
            buffer.push_str(&line);

            if !statement_complete(&buffer) {
                continue;
            }
            let statement = std::mem::take(&mut buffer);
            match self.parse("input", &statement, true, true, false) {
                Ok(()) => {}
                Err(InterpError::Exit { value }) => {
                    self.exit_value = value;
                    return Ok(());
                }
                Err(error) => {
                    let report = self.render_diagnostic(&error);
                    self.write_text(&report);
                    self.write_text("\n");
                    // abandon any frames a failed call left behind
                    self.frames.clear();
                    while self.arena.pop_frame().is_ok() {}
                }
            }
        }
    }

    /// Look up the scripted `main` and call it with the host's argument
    /// list bound as `(int argc, char **argv)`. The return value (or the
    /// value passed to `exit`) becomes [`Interpreter::exit_value`].
    pub fn call_main(&mut self, args: &[&str]) -> Result<()> {
        let Some(main_sym) = self.interner.get("main") else {
            return Err(InterpError::NoMainFunction);
        };
        let Some(main_value) = self.variable_lookup(main_sym) else {
            return Err(InterpError::NoMainFunction);
        };

        let mut parser = self.startup_parser();

        let crate::interpreter::values::ValSlot::Func(func_id) = &main_value.slot else {
            return Err(InterpError::NoMainFunction);
        };
        let def = self.functions[func_id.0 as usize].clone();

        let call_args: Vec<Operand> = if def.params.is_empty() {
            Vec::new()
        } else {
            // build argv in the heap: a NULL-terminated char* array
            let argv_addr = self
                .arena
                .alloc((args.len() + 1) * crate::interpreter::types::POINTER_SIZE)
                .map_err(|error| InterpError::from_arena(error, self.location(&parser)))?;
            for (index, arg) in args.iter().enumerate() {
                let bytes = arg.as_bytes();
                let string_addr = self
                    .arena
                    .alloc(bytes.len() + 1)
                    .map_err(|error| InterpError::from_arena(error, self.location(&parser)))?;
                self.arena
                    .write_bytes(string_addr, bytes)
                    .map_err(|error| InterpError::from_arena(error, self.location(&parser)))?;
                self.arena
                    .write_u64(
                        argv_addr + (index * crate::interpreter::types::POINTER_SIZE) as u64,
                        string_addr,
                    )
                    .map_err(|error| InterpError::from_arena(error, self.location(&parser)))?;
            }
            vec![
                Operand::imm(self.types.int_type, Scalar::Int(args.len() as i64)),
                Operand::imm(self.types.char_ptr_ptr_type, Scalar::Ptr(argv_addr)),
            ]
        };

        if !def.params.is_empty() && def.params.len() != 2 {
            return Err(InterpError::Host {
                message: "main() should take either 0 or 2 parameters".to_string(),
            });
        }

        match self.invoke_function(&mut parser, main_sym, &main_value, &call_args) {
            Ok(result) => {
                if self.types.base(def.ret_type).is_integer() {
                    if let Ok(value) = self.coerce_int(&parser, &result) {
                        self.exit_value = value;
                    }
                }
                Ok(())
            }
            Err(InterpError::Exit { value }) => {
                self.exit_value = value;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Format an error the way the CLI reports it: the located message,
    /// then the offending source line with a caret when the source is
    /// still around.
    pub fn render_diagnostic(&self, error: &InterpError) -> String {
        let mut report = error.to_string();
        let Some(location) = error.location() else {
            return report;
        };
        let source_line = self.chunks.iter().find_map(|chunk| {
            let file = self.interner.resolve(chunk.file);
            if file != location.file {
                return None;
            }
            let source = chunk.source.as_deref()?;
            source.lines().nth(location.line.saturating_sub(1) as usize)
        });
        if let Some(line) = source_line {
            report.push('\n');
            report.push_str(line);
            report.push('\n');
            let caret_col = location.column.saturating_sub(1) as usize;
            report.push_str(&" ".repeat(caret_col.min(line.len())));
            report.push('^');
        }
        report
    }
}

/// Is this buffered input a complete statement? Complete means balanced
/// brackets and ending with `;`, `}`, or a preprocessor line.
fn statement_complete(buffer: &str) -> bool {
    let mut interner = crate::interpreter::table::Interner::new();
    let Ok(tokens) = Lexer::new(buffer).tokenize(&mut interner) else {
        // a lex error will be reported when the statement runs
        return true;
    };
    let mut depth = 0i64;
    let mut last_kind = None;
    for token in &tokens {
        match token.kind {
            TokenKind::OpenBrace | TokenKind::OpenParen | TokenKind::OpenBracket => depth += 1,
            TokenKind::CloseBrace | TokenKind::CloseParen | TokenKind::CloseBracket => depth -= 1,
            TokenKind::Eof => break,
            _ => {}
        }
        if token.kind != TokenKind::Eof {
            last_kind = Some(token.kind.clone());
        }
    }
    if depth > 0 {
        return false;
    }
    matches!(
        last_kind,
        None | Some(TokenKind::Semicolon)
            | Some(TokenKind::CloseBrace)
            | Some(TokenKind::EndOfLine)
    )
}
