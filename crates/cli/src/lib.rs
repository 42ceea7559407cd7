//! `psp` command line: runs the session server and manages the local session
//! store. Every command prints one JSON envelope (see [`output`]).

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
