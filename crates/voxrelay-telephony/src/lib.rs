pub mod audio;
pub mod auth;
pub mod bridge_client;
pub mod config;
pub mod db;
pub mod dtmf;
pub mod error;
pub mod gateway_client;
pub mod internal_api;
pub mod media_stream;
pub mod server;
pub mod state;
pub mod webhooks;
