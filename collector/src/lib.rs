pub mod api;
pub mod collect;
pub mod config;
pub mod envelope;
pub mod identity;
pub mod payload;
pub mod prometheus;
pub mod router;
pub mod server;
pub mod sinks;
pub mod time;
pub mod utils;
