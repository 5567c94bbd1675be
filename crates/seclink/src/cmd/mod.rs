use clap::{Args, Subcommand};

use crate::exit::CliResult;

pub mod listen;
pub mod send;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept links and echo encrypted messages back.
    Listen(ListenArgs),
    /// Connect, negotiate a key, and send one message.
    Send(SendArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args),
        Command::Send(args) => send::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind, e.g. 127.0.0.1:7070.
    pub addr: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to, e.g. 127.0.0.1:7070.
    pub addr: String,
    /// Message text to send once the link is encrypted.
    pub message: String,
    /// Wait for one reply and print it to stdout.
    #[arg(long)]
    pub wait: bool,
    /// Time allowed for the key exchange and the reply (e.g. 30s, 500ms).
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}
