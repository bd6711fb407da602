//! Error types shared by the pager, B+-tree, and REPL.
use std::fmt;

/// The three error kinds the spec distinguishes: a bad statement the user
/// typed (REPL keeps going), a rejected mutation (REPL keeps going), or a
/// storage/IO problem the process cannot recover from (REPL exits).
#[derive(Debug)]
pub enum Error {
    /// Syntax error, unrecognized keyword, negative id, or oversized field.
    Parse(String),
    /// Duplicate primary key on INSERT.
    Duplicate(u32),
    /// Page out of bounds, corrupt file length, or any other tree/pager
    /// invariant violation. Fatal: the caller should exit non-zero.
    Storage(String),
    /// I/O failure reading or writing the database file. Fatal.
    Io(std::io::Error),
}

impl Error {
    /// Fatal errors abort the process; Parse/Duplicate are reported and the
    /// REPL continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Io(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "{msg}"),
            Error::Duplicate(id) => write!(
                f,
                "Key ({id}) already exists in table\nFailed to insert, key already exists."
            ),
            Error::Storage(msg) => write!(f, "{msg}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}
