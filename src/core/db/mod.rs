/// Database Module
///
/// The connection/query/result pipeline, organized leaf-first:
/// - **Values** (`value.rs`): parameter values, binding kinds and fetched records
/// - **Result Cursors** (`cursor.rs`): fetch-mode switching and row retrieval over one statement
/// - **Query Execution** (`query.rs`): prepare, bind, execute, query logging and failure classification
/// - **Connection Management** (`connection.rs`): credentials, lazy connection and the `query` entry point
///
/// ## Error Handling
///
/// All operations return the crate-wide `DbalError` type.
pub mod connection;
pub mod cursor;
pub mod query;
pub mod value;

pub use connection::*;
pub use cursor::*;
pub use query::*;
pub use value::*;
