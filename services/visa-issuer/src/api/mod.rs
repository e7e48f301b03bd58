pub mod openapi;
pub mod types;
pub mod visas;
