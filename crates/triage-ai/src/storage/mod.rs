//! Storage backends for the persistence contract.

mod sqlite;

pub use sqlite::SqliteInquiryRepository;
