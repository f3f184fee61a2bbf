pub mod dict;
pub mod handlers;
pub mod rate_limit;

pub use dict::{MappingTable, Record, TableError, resolve};
pub use handlers::{AppState, MAX_QUERY_CHARS, router};
