pub mod cli;
pub mod config;
pub mod merge;
pub mod server;
pub mod split;
pub mod state;
pub mod storage;
pub mod sync;
