pub mod articles;
pub mod errors;
pub mod lists;
#[cfg(test)]
pub mod memory;

pub use articles::{ArticleStore, Backlog, IndexOutcome, PgArticleRepository, UpsertOutcome};
pub use errors::StoreError;
pub use lists::{ListStore, PgListRepository};
