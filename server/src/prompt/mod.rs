pub mod openai;

pub use openai::{EmailSummary, Priority, Summarizer};
