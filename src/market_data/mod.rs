pub mod client;
pub mod poller;
pub mod serde_util;
pub mod types;
