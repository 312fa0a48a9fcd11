// Declare all modules
pub mod accounts;
pub mod config;
pub mod mail;
pub mod storage;
pub mod utils;

// No re-exports here as they're handled in lib.rs
