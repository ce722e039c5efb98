mod class;
mod environment;
mod error;
mod function;
mod interpreter;
mod object;
mod parser;
mod resolver;
mod scanner;
mod syntax;
mod token;

use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

use log::debug;
use structopt::StructOpt;

use error::Error;
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;

#[derive(Debug, StructOpt)]
#[structopt(name = "treelox", about = "A tree-walking interpreter for the Lox language")]
struct Opt {
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,

    /// Read statements from stdin instead of running a script.
    #[structopt(short = "i", long = "interactive")]
    interactive: bool,

    /// Script to run; main.lox in the working directory when omitted.
    #[structopt(parse(from_os_str))]
    script: Option<PathBuf>,
}

struct Lox {
    interpreter: Interpreter,
}

impl Lox {
    fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
        }
    }

    fn run_file(&mut self, path: &Path) -> Result<(), Error> {
        let mut file = File::open(path)?;
        let mut contents = String::new();

        file.read_to_string(&mut contents)?;

        self.run(contents)
    }

    fn run_prompt(&mut self) -> Result<(), Error> {
        let stdin = io::stdin();
        let handle = stdin.lock();

        print!("> ");
        io::stdout().flush()?;
        for line in handle.lines() {
            match self.run(line?) {
                Ok(()) => (),
                // scan/parse/resolve errors were reported where they were
                // found; either way the prompt moves on
                Err(Error::Parse) => (),
                Err(err @ Error::Runtime { .. }) | Err(err @ Error::Io(_)) => {
                    eprintln!("{}", err)
                }
                Err(Error::Return { .. }) => {
                    unreachable!("return signal escaped the interpreter")
                }
            }
            print!("> ");
            io::stdout().flush()?;
        }

        Ok(())
    }

    fn run(&mut self, source: String) -> Result<(), Error> {
        let mut scanner = Scanner::new(source);
        let tokens = scanner.scan_tokens()?;
        debug!("scanned {} tokens", tokens.len());

        let mut parser = Parser::new(tokens);
        let statements = parser.parse()?;
        debug!("parsed {} statements", statements.len());

        // Syntactically clean, so resolve next. The resolver pokes depths
        // straight into the interpreter's side table as it walks; scope
        // errors abort before any code runs.
        let mut resolver = Resolver::new(&mut self.interpreter);
        resolver.resolve_stmts(&statements);
        if resolver.had_error {
            return Err(Error::Parse);
        }

        self.interpreter.interpret(&statements)
    }
}

fn main() {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        2 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    simple_logger::init_with_level(level).unwrap();

    let mut lox = Lox::new();

    if opt.interactive {
        if let Err(err) = lox.run_prompt() {
            eprintln!("{}", err);
            exit(74);
        }
        return;
    }

    let script = opt.script.unwrap_or_else(|| PathBuf::from("main.lox"));
    match lox.run_file(&script) {
        Ok(()) => (),
        Err(err @ Error::Runtime { .. }) => {
            eprintln!("{}", err);
            exit(70);
        }
        Err(Error::Parse) => exit(65),
        Err(Error::Return { .. }) => unreachable!("return signal escaped the interpreter"),
        Err(Error::Io(err)) => {
            eprintln!("{}", err);
            exit(74);
        }
    }
}
