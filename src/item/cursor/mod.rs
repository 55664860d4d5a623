/// Forward-only cursor reader.
pub mod cursor_reader;

pub use cursor_reader::{CursorItemReader, CursorItemReaderBuilder, MIN_FLUSH_INTERVAL};
