//! The two statements and three meta-commands this crate understands, and
//! the parser that turns a raw REPL line into one or the other.
use crate::errors::Error;
use crate::sql::tokenizer::tokenize;
use crate::storage::row::Row;

#[derive(Debug, PartialEq, Eq)]
pub enum MetaCommand {
    Exit,
    Btree,
    Constants,
}

#[derive(Debug)]
pub enum Statement {
    Insert(Row),
    Select,
}

/// Parses a leading `.` line into a known meta-command.
pub fn parse_meta_command(input: &str) -> Result<MetaCommand, Error> {
    match input {
        ".exit" => Ok(MetaCommand::Exit),
        ".btree" => Ok(MetaCommand::Btree),
        ".constants" => Ok(MetaCommand::Constants),
        _ => Err(Error::Parse(format!("Unrecognized command '{input}'."))),
    }
}

/// Parses an `INSERT` or `SELECT` statement.
pub fn parse_statement(input: &str) -> Result<Statement, Error> {
    let tokens = tokenize(input);
    match tokens.first().copied() {
        Some("INSERT") => parse_insert(input, &tokens),
        Some("SELECT") => {
            if tokens.len() != 1 {
                return Err(Error::Parse(format!("Syntax error in statement '{input}'.")));
            }
            Ok(Statement::Select)
        }
        Some(_) => Err(Error::Parse(format!(
            "Unrecognized keyword at start of '{input}'."
        ))),
        None => Err(Error::Parse(format!(
            "Unrecognized keyword at start of '{input}'."
        ))),
    }
}

fn parse_insert(input: &str, tokens: &[&str]) -> Result<Statement, Error> {
    let syntax_error = || Error::Parse(format!("Syntax error in statement '{input}'."));

    let [_, id, username, email] = tokens else {
        return Err(syntax_error());
    };

    let id: i64 = id.parse().map_err(|_| syntax_error())?;
    if id < 0 || id > u32::MAX as i64 {
        return Err(syntax_error());
    }

    Row::new(id as u32, username, email).map(Statement::Insert)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_meta_commands() {
        assert_eq!(parse_meta_command(".exit").unwrap(), MetaCommand::Exit);
        assert_eq!(parse_meta_command(".btree").unwrap(), MetaCommand::Btree);
        assert_eq!(parse_meta_command(".constants").unwrap(), MetaCommand::Constants);
        assert!(parse_meta_command(".bogus").is_err());
    }

    #[test]
    fn parses_insert_statement() {
        let stmt = parse_statement("INSERT 1 user1 person1@example.com").unwrap();
        match stmt {
            Statement::Insert(row) => {
                assert_eq!(row.id, 1);
                assert_eq!(row.username_str(), "user1");
            }
            _ => panic!("expected Insert"),
        }
    }

    #[test]
    fn rejects_malformed_insert() {
        assert!(parse_statement("INSERT foo bar 1").is_err());
    }

    #[test]
    fn rejects_negative_id() {
        assert!(parse_statement("INSERT -1 user1 person1@example.com").is_err());
    }

    #[test]
    fn rejects_unrecognized_keyword() {
        let err = parse_statement("SELETC").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unrecognized keyword at start of 'SELETC'."
        );
    }

    #[test]
    fn parses_bare_select() {
        assert!(matches!(parse_statement("SELECT").unwrap(), Statement::Select));
    }
}
