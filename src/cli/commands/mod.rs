pub mod token;

pub use token::{TokenCommands, token_command};
