pub mod adaptive;
pub mod embed_writer;
pub mod scheduler;
pub mod summary;
