//! Quote acquisition and the shared quote board.
//!
//! This module handles:
//! - Quote and top-of-book types
//! - The staleness-gated [`QuoteFeed`]
//! - The [`QuoteSource`] interface with polling and websocket implementations

pub mod feed;
pub mod source;
pub mod stream;
pub mod types;

pub use feed::QuoteFeed;
pub use source::{PollSource, QuoteSource};
pub use stream::{ReconnectConfig, StreamSource};
pub use types::{PairQuote, Quote, RestBook, RestLevel, TopOfBook};
