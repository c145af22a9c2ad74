//! Repository Layer
//!
//! Document collection abstraction and its implementations.

mod clock;
mod firestore;
mod memory;
mod sqlite;
mod traits;

#[cfg(test)]
mod tests;

pub use clock::ServerClock;
pub use firestore::FirestoreCollection;
pub use memory::MemoryCollection;
pub use sqlite::SqliteCollection;
pub use traits::{sort_newest_first, ChangeFeed, ChangeKind, CollectionEvent, DocumentCollection};
