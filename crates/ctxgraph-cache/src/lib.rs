pub mod working_memory;

pub use working_memory::{CacheStats, WorkingMemoryCache, MAX_FILE_BYTES, MAX_LINES};
