/// Sessions, cursors and pages a reader pulls rows from.
pub mod source;

/// In-process database used by the store jobs and the tests.
pub mod memory;

/// This module provides a cursor item reader implementation.
pub mod cursor;

/// This module provides the paging item readers (transacted, detached and N+1).
pub mod paging;

#[cfg(feature = "logger")]
/// This module provides a logger item writer implementation.
pub mod logger;

#[cfg(feature = "rdbc-sqlite")]
/// This module provides a SQLite row source, transaction manager and item writer.
pub mod rdbc;
