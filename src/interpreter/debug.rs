//! Breakpoint surface
//!
//! A small table keyed by file name mapping to (line, column) pairs, and a
//! per-statement hook that fires when the parser reaches a breakpoint while
//! debug mode is on. The hook just reports the position to the host; a
//! front end can watch the output stream to drive stepping.

use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::table::DeclSite;

impl Interpreter {
    /// Arm a breakpoint at (file, line, column).
    pub fn breakpoint_set(&mut self, file: &str, line: u32, column: u32) {
        let key = self.interner.register(file);
        match self.breakpoints.get_mut(key) {
            Some(entry) => {
                if !entry.value.contains(&(line, column)) {
                    entry.value.push((line, column));
                }
            }
            None => {
                self.breakpoints.set(key, vec![(line, column)], DeclSite::NONE);
            }
        }
    }

    /// Disarm a breakpoint; returns whether one was armed there.
    pub fn breakpoint_clear(&mut self, file: &str, line: u32, column: u32) -> bool {
        let Some(key) = self.interner.get(file) else {
            return false;
        };
        match self.breakpoints.get_mut(key) {
            Some(entry) => {
                let before = entry.value.len();
                entry.value.retain(|&position| position != (line, column));
                before != entry.value.len()
            }
            None => false,
        }
    }

    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.iter().map(|entry| entry.value.len()).sum()
    }

    /// Called before each statement when debug mode is on.
    pub(crate) fn debug_check_statement(&mut self, parser: &ParserState) {
        if self.breakpoints.is_empty() {
            return;
        }
        let chunk = &self.chunks[parser.chunk.0 as usize];
        let Some(token) = chunk.tokens.get(parser.cursor) else {
            return;
        };
        let position = (token.span.line, token.span.column);
        let hit = self
            .breakpoints
            .get(parser.file)
            .is_some_and(|entry| entry.value.contains(&position));
        if hit {
            let file = self.interner.resolve(parser.file).to_string();
            self.write_text(&format!(
                "break at {}:{}:{}\n",
                file, position.0, position.1
            ));
        }
    }
}
