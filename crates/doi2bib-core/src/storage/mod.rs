pub mod backup;

pub use backup::{backup_file, backup_path, write_if_changed};
