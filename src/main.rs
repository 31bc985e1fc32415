// minic: an embeddable single-pass C interpreter

use clap::Parser as ArgParser;

use minic::interpreter::instance::DEFAULT_ARENA_SIZE;
use minic::Interpreter;

/// Run C source files, or start an interactive prompt.
#[derive(ArgParser, Debug)]
#[command(name = "minic", version, about)]
struct Args {
    /// Source files to run; the first file's main() is called with the
    /// remaining arguments
    files: Vec<String>,

    /// Start an interactive prompt instead of calling main()
    #[arg(short, long)]
    interactive: bool,

    /// Arena size in bytes (stack and heap combined)
    #[arg(short = 's', long, default_value_t = DEFAULT_ARENA_SIZE)]
    arena_size: usize,

    /// Don't call main() after loading the files
    #[arg(short = 'n', long)]
    no_main: bool,

    /// Enable the per-statement breakpoint hook
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.files.is_empty() && !args.interactive {
        eprintln!("Error: no input files");
        eprintln!();
        eprintln!("Usage: minic <file.c> [script args...]");
        eprintln!("       minic -i");
        std::process::exit(1);
    }

    let mut interpreter = Interpreter::new(args.arena_size);
    if let Err(error) = interpreter.include_all_system_headers() {
        eprintln!("{}", interpreter.render_diagnostic(&error));
        std::process::exit(1);
    }

    if args.interactive {
        if let Err(error) = interpreter.parse_interactive() {
            eprintln!("{}", interpreter.render_diagnostic(&error));
            std::process::exit(1);
        }
        std::process::exit(interpreter.exit_value() as i32);
    }

    // the first file is the program; everything after it is argv for main
    let program = args.files[0].clone();
    let source = match std::fs::read_to_string(&program) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Error: can't read '{}': {}", program, error);
            std::process::exit(1);
        }
    };
    if let Err(error) = interpreter.parse(&program, &source, true, false, args.debug) {
        eprintln!("{}", interpreter.render_diagnostic(&error));
        std::process::exit(1);
    }

    if !args.no_main {
        let mut argv: Vec<&str> = vec![program.as_str()];
        argv.extend(args.files[1..].iter().map(String::as_str));
        if let Err(error) = interpreter.call_main(&argv) {
            eprintln!("{}", interpreter.render_diagnostic(&error));
            std::process::exit(1);
        }
    }

    std::process::exit(interpreter.exit_value() as i32);
}
