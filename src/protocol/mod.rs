//! RESP wire format: value type and incremental reply parser.

mod parser;
mod types;

pub use parser::Parser;
pub use types::RespValue;
