//! hostwatch - host threat monitoring library
//!
//! This library exposes the event model, the event bus, the threat
//! intelligence cache, the polling monitors and the agent that wires them
//! together, so each piece can be driven directly with fake host sources.

pub mod bus;
pub mod cli;
pub mod constants;
pub mod daemon;
pub mod intel;
pub mod models;
pub mod monitor;
pub mod output;
pub mod sources;
