pub mod statement;
pub mod tokenizer;

pub use statement::{parse_meta_command, parse_statement, MetaCommand, Statement};
