pub mod doi;
pub mod extract;

pub use doi::Doi;
pub use extract::{extract_dois_from_text, read_dois_from_file};
