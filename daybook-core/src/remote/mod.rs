//! Remote document collections.

pub mod document;
pub mod faulty;
pub mod memory;
pub mod store;

pub use document::{Collection, Document, Fields};
pub use memory::MemoryDocumentStore;
pub use store::{DocumentStore, Subscription};
