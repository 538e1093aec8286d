//! A single value that discards itself after a fixed time-to-live.
//!
//! ```no_run
//! # async fn demo() -> Result<(), timed_value::HolderError> {
//! use timed_value::TimedValueHolder;
//!
//! let mut token = TimedValueHolder::new(30_000.0, Some("abc".to_owned()))?;
//! assert_eq!(token.get().as_deref(), Some("abc"));
//! token.set("def".to_owned()); // countdown starts over
//! token.clear();
//! assert!(token.is_empty());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod holder;
pub mod scheduler;

pub use config::Ttl;
pub use error::{HolderError, Result};
pub use holder::TimedValueHolder;
pub use scheduler::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};
