//! Dead-letter queries

pub mod get_dead_letter;
pub mod list_dead_letters;

pub use get_dead_letter::GetDeadLetterQuery;
pub use list_dead_letters::{ListDeadLettersQuery, ListDeadLettersResponse};
