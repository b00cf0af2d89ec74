//! Domain Layer
//!
//! Canonical models shared by every other layer. No I/O lives here.

pub mod error;
pub mod event;
pub mod filter;
pub mod matches;
pub mod odds;

pub use error::{FeedError, Result};
pub use event::{Event, EventSource, EventType};
pub use filter::{EventFilter, MatchFilter};
pub use matches::{Match, MatchStatus, Score, Statistics, Team};
pub use odds::{Market, Odds, OddsStatus, Outcome};
