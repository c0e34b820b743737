//! Options volatility screener.
//!
//! Periodically evaluates a watch list of equities against Bollinger Bands
//! and option implied volatility, and flags single-leg long call or long put
//! candidates. Market data comes through a [`gateway::MarketDataGateway`];
//! results live in a [`registry::WatchList`] refreshed by a
//! [`scheduler::Scheduler`].

pub mod classifier;
pub mod config;
pub mod error;
pub mod gateway;
pub mod indicators;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod scheduler;

pub use error::{Result, ScreenError, VolscanError};
