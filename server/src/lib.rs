//! OpenChat Server
//!
//! Real-time control plane for voice channels in a self-hostable chat server:
//! short-lived join tickets over HTTP, WebSocket signaling between channel
//! participants, and the directory/capability services they lean on.

pub mod api;
pub mod capabilities;
pub mod config;
pub mod directory;
pub mod rtc;
