//! Binary entrypoint for the chat digest server.
//! Run with: cargo run --bin chat-digest-server

use std::process::ExitCode;

use chat_digest::start_chat_digest;

fn main() -> ExitCode {
    start_chat_digest::run()
}
