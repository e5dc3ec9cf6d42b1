//! Job handles are stored in a SQLite database so they outlive the process that submitted them

/// Connect to a SQLite database
pub mod open;
pub mod job;
