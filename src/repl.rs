//! The read-eval-print loop: prints `db > `, reads one line, dispatches it
//! to a meta-command or a statement, and prints the result. Parse and
//! duplicate-key errors are reported and the loop continues; `.exit`
//! flushes the pager and returns.
use std::io::{self, BufRead, Write};

use tracing::{info, warn};

use crate::errors::Error;
use crate::sql::{parse_meta_command, parse_statement, MetaCommand, Statement};
use crate::storage::Table;

const PROMPT: &str = "db > ";

pub fn run(mut table: Table) -> Result<(), Error> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{PROMPT}");
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => {
                table.close()?;
                return Ok(());
            }
        };
        let line = line.trim_end();

        if line.starts_with('.') {
            match parse_meta_command(line) {
                Ok(MetaCommand::Exit) => {
                    info!("Exiting");
                    table.close()?;
                    return Ok(());
                }
                Ok(MetaCommand::Btree) => print!("{}", table.print_btree()?),
                Ok(MetaCommand::Constants) => print!("{}", Table::print_constants()),
                Err(e) => println!("{e}"),
            }
            continue;
        }

        match parse_statement(line) {
            Ok(Statement::Insert(row)) => match table.insert(row) {
                Ok(()) => println!("Executed."),
                Err(e @ Error::Duplicate(_)) => {
                    warn!(%e, "Rejected duplicate insert");
                    println!("{e}");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => println!("{e}"),
            },
            Ok(Statement::Select) => {
                for row in table.select_all()? {
                    println!("{row}");
                }
                println!("Executed.");
            }
            Err(e) => println!("{e}"),
        }
    }
}
