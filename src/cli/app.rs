use super::commands::TokenCommands;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "declare-cli")]
#[command(about = "Back-office tooling for social-insurance declaration portals")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Portal token lifecycle management
    Token(TokenCommands),
}
