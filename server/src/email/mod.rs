pub mod client;
pub mod digest;
pub mod message;
