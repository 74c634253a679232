pub mod cli;
pub mod client;
pub mod cluster;
pub mod concepts;
pub mod config;
pub mod tutor;
