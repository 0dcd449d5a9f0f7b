//! Dispatch scheduling: the polling engine and its trigger
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  PollTrigger                 │  fixedRate(10s) | cron("0 */5 * * * *")
//! │  - single-flight guard       │
//! └──────────────┬───────────────┘
//!                │ check_and_dispatch()
//!                ▼
//! ┌──────────────────────────────┐      ┌───────────────────┐
//! │  ContentDispatcher           │─────▶│  ContentStore     │
//! │  - window now ± 30s          │      └───────────────────┘
//! │  - PENDING → SENT | FAILED   │
//! └──────────────┬───────────────┘
//!                │ dispatch(content)
//!                ▼
//!       DispatchStrategy (direct | queue)
//! ```
//!
//! # Modules
//!
//! - [`dispatcher`] - One poll: query, dispatch, persist outcome
//! - [`trigger`] - Cadence selection and the trigger loop
//! - [`clock`] - Injectable time source
//! - [`error`] - Scheduler error types
//!
//! # Quick Start
//!
//! ```ignore
//! use newsletter::scheduler::{ContentDispatcher, PollTrigger, SchedulerStrategy};
//!
//! let dispatcher = Arc::new(ContentDispatcher::new(contents, strategy));
//! let trigger = PollTrigger::new(dispatcher, SchedulerStrategy::from_config(&config.scheduler)?);
//! trigger.start().await?;
//! ```

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod trigger;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dispatcher::{poll_window, ContentDispatcher, PollReport, POLL_WINDOW_SECS};
pub use error::{SchedulerError, SchedulerResult};
pub use trigger::{PollTrigger, SchedulerKind, SchedulerStrategy};
