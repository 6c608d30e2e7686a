// Activity Transfer Pipeline - core library
//
// Moves recorded fitness activities from a source vendor platform to a sink
// vendor platform: a durable job/item state store, a concurrent worker that
// drives items through a staged pipeline with retry and backoff, and the
// settings/template/duplicate-detection services the worker depends on.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::Config;
