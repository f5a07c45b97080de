// src/lib.rs

//! Real-time relay for collaborative grid editing.
//!
//! Editors create a room from a table (headers + rows), then join it over a
//! websocket. Every frame an editor sends is fanned out, untouched, to the
//! room's members by the room's own event loop.

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod room;
pub mod router;
pub mod server;
pub mod state;
pub mod websocket;
