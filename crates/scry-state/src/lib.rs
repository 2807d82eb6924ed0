pub mod embedding;
pub mod gateway;
pub mod memory_gateway;
