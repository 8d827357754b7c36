//! Aden - MMORPG game server
//!
//! A tick-driven world server speaking the 3.80C client protocol.

// ============================================
// Core Modules
// ============================================

/// Server configuration (YAML)
pub mod config;
/// Tick cadence and shutdown signalling
pub mod core;
/// Per-connection session state and egress queue
pub mod session;
/// Framing, cipher and packet primitives
pub mod network;
/// Static game data (items, npcs, maps, ...)
pub mod database;
/// Persistent storage behind repository traits
pub mod repo;

// ============================================
// World and Server
// ============================================

/// World state and the entities living in it
pub mod game;
/// Server implementation
pub mod servers;
