//! Repository modules for database operations

pub mod tokens;
