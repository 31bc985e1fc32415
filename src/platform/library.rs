//! Library bundle registration and inclusion
//!
//! A bundle packages a header name, an optional setup callback (platform
//! variables), a list of intrinsic functions with their C prototypes, and
//! an optional C source snippet (typedefs and macros). Registering records
//! the bundle; `#include`-ing it runs the setup, parses the snippet, then
//! parses each prototype and patches the resulting function definition to
//! point at the native entry.

use tracing::debug;

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::{ParserState, TokenChunk};
use crate::interpreter::table::Symbol;
use crate::interpreter::values::{FuncBody, ValSlot, Value};
use crate::lexer::{Lexer, TokenKind};

/// An intrinsic function implementation. It receives the instance, the
/// calling parser state (for diagnostics), a return slot pre-allocated per
/// the declared return type, and the evaluated arguments. It must not
/// retain references into the argument array, and may fail through the
/// normal error channel.
pub type NativeFn = fn(&mut Interpreter, &ParserState, &Value, &[Value]) -> Result<()>;

#[derive(Clone)]
pub struct LibraryEntry {
    pub native: NativeFn,
    pub prototype: &'static str,
}

#[derive(Clone)]
pub struct LibraryBundle {
    pub name: &'static str,
    pub setup: Option<fn(&mut Interpreter) -> Result<()>>,
    pub entries: Vec<LibraryEntry>,
    pub defs: Option<&'static str>,
}

impl Interpreter {
    /// Record a bundle so the scripted program (or the host) can include it.
    pub fn register_library(&mut self, bundle: LibraryBundle) {
        self.libraries.push(bundle);
    }

    /// Activate every registered bundle.
    pub fn include_all_system_headers(&mut self) -> Result<()> {
        let names: Vec<&'static str> = self.libraries.iter().map(|bundle| bundle.name).collect();
        for name in names {
            self.include(name)?;
        }
        Ok(())
    }

    /// Activate one bundle by header name; repeated includes are no-ops.
    pub fn include(&mut self, name: &str) -> Result<()> {
        if self.included.iter().any(|done| done == name) {
            return Ok(());
        }
        let Some(bundle) = self
            .libraries
            .iter()
            .find(|bundle| bundle.name == name)
            .cloned()
        else {
            return Err(InterpError::Host {
                message: format!("header file '{}' is not registered", name),
            });
        };
        self.included.push(name.to_string());
        debug!(header = name, "including library");

        if let Some(setup) = bundle.setup {
            setup(self)?;
        }
        if let Some(defs) = bundle.defs {
            self.parse(bundle.name, defs, true, false, false)?;
        }
        for entry in &bundle.entries {
            self.library_add(bundle.name, entry.native, entry.prototype)?;
        }
        Ok(())
    }

    /// `#include` from scripted code.
    pub(crate) fn include_by_symbol(
        &mut self,
        parser: &ParserState,
        name: Symbol,
    ) -> Result<()> {
        let name = self.interner.resolve(name).to_string();
        self.include(&name).map_err(|error| match error {
            InterpError::Host { message } => InterpError::Syntax {
                message,
                location: self.location(parser),
            },
            other => other,
        })
    }

    /// Parse one intrinsic prototype and patch the defined function to
    /// dispatch to `native`.
    fn library_add(
        &mut self,
        bundle_name: &'static str,
        native: NativeFn,
        prototype: &'static str,
    ) -> Result<()> {
        let file = self.interner.register(bundle_name);
        let tokens = Lexer::new(prototype)
            .tokenize(&mut self.interner)
            .map_err(|error| InterpError::Host {
                message: format!(
                    "bad intrinsic prototype '{}': {}",
                    prototype, error.message
                ),
            })?;

        // the declared name is the identifier right before the first '('
        let mut declared = None;
        for pair in tokens.windows(2) {
            if let (TokenKind::Ident(name), TokenKind::OpenParen) = (&pair[0].kind, &pair[1].kind) {
                declared = Some(*name);
                break;
            }
        }
        let Some(declared) = declared else {
            return Err(InterpError::Host {
                message: format!("no function name in prototype '{}'", prototype),
            });
        };

        let chunk = self.add_chunk(TokenChunk {
            file,
            tokens,
            source: Some(prototype.to_string()),
        });
        let mut parser = ParserState::new(chunk, file, true, false);
        loop {
            if let crate::interpreter::statements::ParseOutcome::Eof = self.statement(&mut parser)?
            {
                break;
            }
        }

        let Some(value) = self.globals.live.get(declared).map(|entry| entry.value.clone()) else {
            return Err(InterpError::Host {
                message: format!("prototype '{}' didn't define a function", prototype),
            });
        };
        let ValSlot::Func(func_id) = value.slot else {
            return Err(InterpError::Host {
                message: format!("prototype '{}' didn't define a function", prototype),
            });
        };
        self.functions[func_id.0 as usize].body = FuncBody::Intrinsic(native);
        Ok(())
    }
}
