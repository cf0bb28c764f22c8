pub mod config;
pub mod logging;
pub mod notify;
pub mod state;
pub mod store;
