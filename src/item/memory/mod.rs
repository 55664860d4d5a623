/// Entity handles and the aggregate contract of stored rows.
pub mod entity;

/// In-process row source with sessions, cursors and pages.
pub mod database;

/// Transactional output table and its writer.
pub mod table;

pub use database::{MemoryDatabase, MemoryQuery};
pub use entity::{Aggregate, Managed};
pub use table::{MemoryItemWriter, MemoryTable};
