pub mod error;
pub mod health;
pub mod operations;
pub mod storage;
pub mod storage_postgres;
pub mod types;
