#[path = "../common/mod.rs"]
mod common;

mod callbacks;
mod concurrency;
mod config;
mod lifecycle;
