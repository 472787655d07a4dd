pub mod autostart;
pub mod block;
pub mod config;
pub mod daemon;
pub mod helpers;
pub mod permissions;
pub mod ritual;
pub mod today;
