use std::fmt;
use std::io;

use crate::object::Object;
use crate::token::{Token, TokenType};

// One channel for everything that can stop a statement from finishing.
// `Return` is not a failure: it is the unwinding signal a `return` statement
// sends back to the enclosing Function::call, and it must never be reported.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Parse,
    Runtime { token: Token, message: String },
    Return { value: Object },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{}", err),
            Error::Parse => write!(f, "parse error"),
            Error::Runtime { token, message } => {
                write!(f, "{}\n[line {}]", message, token.line)
            }
            Error::Return { .. } => write!(f, "return signal escaped the interpreter"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub fn error(line: i32, message: &str) {
    report(line, "", message);
}

pub fn parser_error(token: &Token, message: &str) {
    if token.token_type == TokenType::Eof {
        report(token.line, " at end", message);
    } else {
        report(token.line, &format!(" at '{}'", token.lexeme), message);
    }
}

fn report(line: i32, where_: &str, message: &str) {
    eprintln!("[line {line}] Error{where_}: {message}");
}
