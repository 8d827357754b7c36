//! Server implementations
//!
//! One process hosts everything: authentication, character select and the
//! world all run behind the same listener.

pub mod map;
