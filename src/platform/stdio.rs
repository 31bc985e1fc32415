//! stdio.h shims
//!
//! Formatted output (`printf`, `sprintf`), line and character I/O. The
//! format engine supports `%d %i %u %x %o %c %s %f %e %g %p %%` with the
//! `-`/`0` flags, a field width, a precision for floats, and the ignored
//! length modifier `l`.

use crate::interpreter::errors::{InterpError, Result};
use crate::interpreter::instance::Interpreter;
use crate::interpreter::parser::ParserState;
use crate::interpreter::values::Value;
use crate::platform::library::{LibraryBundle, LibraryEntry};

pub fn bundle() -> LibraryBundle {
    LibraryBundle {
        name: "stdio.h",
        setup: None,
        entries: vec![
            LibraryEntry {
                native: lib_printf,
                prototype: "int printf(char *, ...);",
            },
            LibraryEntry {
                native: lib_sprintf,
                prototype: "int sprintf(char *, char *, ...);",
            },
            LibraryEntry {
                native: lib_puts,
                prototype: "int puts(char *);",
            },
            LibraryEntry {
                native: lib_putchar,
                prototype: "int putchar(int);",
            },
            LibraryEntry {
                native: lib_getchar,
                prototype: "int getchar();",
            },
            LibraryEntry {
                native: lib_gets,
                prototype: "char *gets(char *);",
            },
        ],
        defs: Some("#define EOF (-1)\n#define NULL 0\n"),
    }
}

/// Apply field width and justification flags to a rendered conversion.
fn pad(text: String, width: usize, zero_pad: bool, left_justify: bool) -> String {
    if text.len() >= width {
        return text;
    }
    let fill = width - text.len();
    if left_justify {
        let mut padded = text;
        padded.push_str(&" ".repeat(fill));
        padded
    } else if zero_pad && !text.starts_with('-') {
        format!("{}{}", "0".repeat(fill), text)
    } else if zero_pad {
        // keep the sign in front of the zeros
        format!("-{}{}", "0".repeat(fill), &text[1..])
    } else {
        format!("{}{}", " ".repeat(fill), text)
    }
}

fn fetch_arg<'a>(
    instance: &Interpreter,
    parser: &ParserState,
    args: &'a [Value],
    next: &mut usize,
) -> Result<&'a Value> {
    let arg = args.get(*next).ok_or_else(|| {
        instance.type_error(parser, "not enough arguments for the format string")
    })?;
    *next += 1;
    Ok(arg)
}

fn format_args(
    instance: &Interpreter,
    parser: &ParserState,
    format: &str,
    args: &[Value],
) -> Result<String> {
    let mut output = String::new();
    let mut chars = format.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(ch) = chars.next() {
        if ch != '%' {
            output.push(ch);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            output.push('%');
            continue;
        }

        let mut left_justify = false;
        let mut zero_pad = false;
        loop {
            match chars.peek() {
                Some('-') => {
                    left_justify = true;
                    chars.next();
                }
                Some('0') => {
                    zero_pad = true;
                    chars.next();
                }
                _ => break,
            }
        }
        let mut width = 0usize;
        while let Some(digit) = chars.peek().and_then(|ch| ch.to_digit(10)) {
            width = width * 10 + digit as usize;
            chars.next();
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut value = 0usize;
            while let Some(digit) = chars.peek().and_then(|ch| ch.to_digit(10)) {
                value = value * 10 + digit as usize;
                chars.next();
            }
            precision = Some(value);
        }
        while matches!(chars.peek(), Some('l') | Some('h')) {
            chars.next();
        }

        let Some(spec) = chars.next() else {
            output.push('%');
            break;
        };
        let rendered = match spec {
            'd' | 'i' => {
                let value = instance.value_int(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                value.to_string()
            }
            'u' => {
                let value = instance.value_int(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                (value as u64).to_string()
            }
            'x' => {
                let value = instance.value_int(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                format!("{:x}", value as u64)
            }
            'o' => {
                let value = instance.value_int(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                format!("{:o}", value as u64)
            }
            'c' => {
                let value = instance.value_int(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                ((value as u8) as char).to_string()
            }
            's' => {
                let arg = fetch_arg(instance, parser, args, &mut next_arg)?;
                instance.value_cstring(parser, arg)?
            }
            'f' => {
                let value = instance.value_fp(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                format!("{:.*}", precision.unwrap_or(6), value)
            }
            'e' => {
                let value = instance.value_fp(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                format!("{:.*e}", precision.unwrap_or(6), value)
            }
            'g' => {
                let value = instance.value_fp(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                format!("{}", value)
            }
            'p' => {
                let value = instance.value_ptr(parser, fetch_arg(instance, parser, args, &mut next_arg)?)?;
                format!("0x{:x}", value)
            }
            other => {
                return Err(instance.type_error(
                    parser,
                    format!("unsupported format conversion '%{}'", other),
                ));
            }
        };
        output.push_str(&pad(rendered, width, zero_pad, left_justify));
    }

    Ok(output)
}

fn lib_printf(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let format = instance.value_cstring(parser, &args[0])?;
    let text = format_args(instance, parser, &format, &args[1..])?;
    let written = text.len() as i64;
    instance.write_text(&text);
    instance.set_value_int(parser, ret, written)
}

fn lib_sprintf(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let target = instance.value_ptr(parser, &args[0])?;
    let format = instance.value_cstring(parser, &args[1])?;
    let text = format_args(instance, parser, &format, &args[2..])?;
    let mut bytes = text.into_bytes();
    bytes.push(0);
    instance
        .arena
        .write_bytes(target, &bytes)
        .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
    instance.set_value_int(parser, ret, bytes.len() as i64 - 1)
}

fn lib_puts(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let text = instance.value_cstring(parser, &args[0])?;
    instance.write_text(&text);
    instance.write_text("\n");
    instance.set_value_int(parser, ret, text.len() as i64 + 1)
}

fn lib_putchar(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let value = instance.value_int(parser, &args[0])?;
    instance.write_text(&((value as u8) as char).to_string());
    instance.set_value_int(parser, ret, value)
}

fn lib_getchar(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    _args: &[Value],
) -> Result<()> {
    let value = match instance.io.get_char() {
        Some(byte) => byte as i64,
        None => -1,
    };
    instance.set_value_int(parser, ret, value)
}

fn lib_gets(
    instance: &mut Interpreter,
    parser: &ParserState,
    ret: &Value,
    args: &[Value],
) -> Result<()> {
    let target = instance.value_ptr(parser, &args[0])?;
    match instance.io.get_line("") {
        None => instance.set_value_ptr(parser, ret, 0),
        Some(line) => {
            let mut bytes = line.trim_end_matches('\n').as_bytes().to_vec();
            bytes.push(0);
            instance
                .arena
                .write_bytes(target, &bytes)
                .map_err(|error| InterpError::from_arena(error, instance.location(parser)))?;
            instance.set_value_ptr(parser, ret, target)
        }
    }
}
