pub mod parser;
pub mod writer;

pub use parser::{parse_file, parse_single, parse_str};
pub use writer::{format_entry, write_file, write_string};
