// RESP transport exports

pub mod handler;
pub mod server;
pub mod utils;

pub use handler::{handle_command, CommandContext};
pub use server::{RespConfig, RespServer};
