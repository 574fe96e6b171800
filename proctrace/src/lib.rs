pub mod channel;
pub mod config;
pub mod core_logic;
pub mod daemon_handler;
pub mod event_loop;
pub mod logger;
pub mod report;
pub mod resolver;
pub mod signal_handler;
