pub mod api;
pub mod config;
pub mod error;
pub mod hardware;
pub mod queue;
pub mod ranking;
pub mod recommend;
pub mod service;
pub mod shutdown;
