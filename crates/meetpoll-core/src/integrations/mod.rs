//! Collaborators at the engine boundary and the implementations shipped with
//! meetpoll.

pub mod file;
pub mod google;
pub mod notify;
pub mod traits;

pub use file::FileCalendarProvider;
pub use google::GoogleFreeBusyProvider;
pub use notify::TracingNotifier;
pub use traits::{BusyBlock, CalendarProvider, MeetingStore, Notifier};
