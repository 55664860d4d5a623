/// Offset/limit paging reader.
pub mod paging_reader;

/// Paging reader loading child collections one parent at a time.
pub mod n1_paging_reader;

pub use n1_paging_reader::{N1PagingItemReader, N1PagingItemReaderBuilder};
pub use paging_reader::{DEFAULT_PAGE_SIZE, PagingItemReader, PagingItemReaderBuilder, PagingMode};
