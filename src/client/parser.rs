//! Parser for the interactive command line: a command word followed by
//! one or two path arguments, e.g. `CREATE_FILE /docs/ report.txt` or
//! `READ_FILE /docs/report.txt`.

use crate::wire::{ClientRequest, RequestType, MAX_ARG_LEN};
use thiserror::Error;

pub fn parse_command(line: &str) -> Result<ClientRequest, ParseError> {
    let mut tokens = line.split_whitespace();
    let word = tokens.next().ok_or(ParseError::Empty)?;
    let request_type = RequestType::from_command_word(word)
        .ok_or_else(|| ParseError::UnknownCommand(word.to_string()))?;
    let args: Vec<&str> = tokens.collect();
    let expected = expected_args(request_type);
    if args.len() != expected {
        return Err(ParseError::WrongArgCount {
            command: request_type.command_word(),
            expected,
            got: args.len(),
        });
    }
    for arg in &args {
        if arg.len() > MAX_ARG_LEN {
            return Err(ParseError::ArgumentTooLong(arg.len()));
        }
    }
    Ok(ClientRequest {
        request_type,
        arg1: args.first().map(|arg| arg.to_string()).unwrap_or_default(),
        arg2: args.get(1).map(|arg| arg.to_string()).unwrap_or_default(),
    })
}

/// Creates name their target as `<directory> <entry>`; everything else
/// addresses one existing path.
fn expected_args(request_type: RequestType) -> usize {
    match request_type {
        RequestType::CreateFile | RequestType::CreateDir => 2,
        RequestType::ReadFile
        | RequestType::WriteFile
        | RequestType::DeleteFile
        | RequestType::DeleteDir
        | RequestType::FileInfo
        | RequestType::ListAll => 1,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command line")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("{command} takes {expected} argument(s), got {got}")]
    WrongArgCount {
        command: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("argument of {0} bytes exceeds limit")]
    ArgumentTooLong(usize),
}
