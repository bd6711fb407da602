//! Splits a REPL input line into whitespace-delimited tokens.
//!
//! The statement grammar this crate accepts (`INSERT <id> <username>
//! <email>`, bare `SELECT`) has no quoting or parenthesization, so a plain
//! whitespace split is sufficient.
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}
