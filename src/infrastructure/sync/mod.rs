mod rows;
pub mod sqlite_attachment_store;
pub mod sqlite_store;

pub use sqlite_attachment_store::SqliteAttachmentStore;
pub use sqlite_store::SqliteLocalStore;
