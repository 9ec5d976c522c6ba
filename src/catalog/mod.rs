//! Catalog records: the books whose availability the projector maintains and
//! whose changes producers publish.

mod client;
mod memory_client;
mod postgres_client;
mod types;

pub use client::{CatalogClient, CatalogError};
pub use memory_client::MemoryCatalog;
pub use postgres_client::PostgresCatalog;
pub use types::{
    AdjustOutcome, AvailabilityChange, Book, BookDetailsUpdate, BookStatus, NewBook,
};
