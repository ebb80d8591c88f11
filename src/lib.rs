//! # Kairos — Process-based Discrete-event Simulation Kernel
//!
//! A deterministic simulation kernel that couples a time-ordered event
//! queue to processes written as plain `async` blocks. A process
//! suspends by awaiting a simulated event; the kernel advances virtual
//! time from one scheduled event to the next, resuming every process
//! parked on each processed event. No threads, no wall-clock time —
//! two runs that make the same calls produce the same trace.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │       Simulation          │ ← execution loop (step / run / run_until)
//! │  ┌────────────────────┐  │
//! │  │     Scheduler      │  │ ← min-heap keyed (time, insertion id)
//! │  └────────────────────┘  │
//! │  ┌────────────────────┐  │
//! │  │   Events / Values  │  │ ← shared-handle state machines
//! │  └────────────────────┘  │
//! │  ┌────────────────────┐  │
//! │  │  Process frames    │  │ ← suspended async bodies
//! │  └────────────────────┘  │
//! └──────────────────────────┘
//!        ▲            ▲
//!   Resource        Store          ← synchronization built on events
//! ```
//!
//! ## Example
//!
//! ```rust
//! use kairos::{Simulation, VirtualTime};
//!
//! let mut sim = Simulation::new();
//! let ctx = sim.handle();
//! sim.spawn(async move {
//!     ctx.timeout(1.0).await;
//!     assert_eq!(ctx.now(), VirtualTime::new(1.0));
//! });
//! sim.run();
//! ```

pub mod event;
pub mod process;
pub mod resource;
pub mod scheduler;
pub mod simulation;
pub mod store;
pub mod time;
pub mod trace;

// Re-exports for convenience.
pub use event::{Awaitable, Event, EventState, ValueEvent};
pub use process::Process;
pub use resource::Resource;
pub use scheduler::{EventId, EventIdGen, ScheduledEvent, Scheduler};
pub use simulation::{SimContext, Simulation};
pub use store::Store;
pub use time::VirtualTime;
pub use trace::{traces_match, Trace, TraceEntry};
