pub mod embed;
pub mod index;
pub mod navigate;
pub mod search;
pub mod summarize;
