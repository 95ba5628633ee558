//! Fatecast Agent Library
//!
//! Off-chain agent for the Fatecast prediction market. It opens price-threshold
//! events from Pyth prices (either from fixed templates or from questions
//! generated by ASI:One) and settles them once their deadline passes.
//!
//! The contract reads the Pyth oracle itself when an event is resolved; the
//! agent only decides which events to open and when to trigger settlement.

pub mod config;
pub mod parser;
pub mod services;
pub mod types;

pub use config::{Config, FeedConfig};
pub use parser::{guess_asset_from_text, parse_question};
pub use services::{
    AgentMetrics, AsiOneClient, EventCreator, EventResolver, MarketClient, PythClient, Scheduler,
};
pub use types::{Asset, CreatedEvent, MarketEvent, NewEvent, ParsedQuestion, PriceBook, Side};
