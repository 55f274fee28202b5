//! Log parsing for perf-style benchmark logs.

pub mod parse;
pub mod row;

pub use parse::parse_file;
pub use row::{ParseResult, ParseState};
