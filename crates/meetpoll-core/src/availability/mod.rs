//! Availability: busy-time collection and ranked slot suggestions.

pub mod collector;
pub mod interval;
pub mod priority;
pub mod slots;
pub mod suggest;

pub use collector::{BusyIntervalCollector, CollectedBusy};
pub use interval::{merge_intervals, TimeInterval};
pub use priority::{default_dayparts, Daypart, SlotPrioritizer};
pub use slots::{SlotGenerator, DEFAULT_POOL_CAP};
pub use suggest::{SuggestionRequest, SuggestionResponse, SuggestionService};
