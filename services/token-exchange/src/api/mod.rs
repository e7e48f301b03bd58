pub mod exchange;
pub mod openapi;
pub mod passports;
pub mod types;
