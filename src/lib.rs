//! facelog - time tracking with a rotating activity cube.
//!
//! The cube reports which of its faces is up. Each face is mapped to a
//! user-defined activity label, and every change of face closes the current
//! activity interval and opens the next one in a SQLite ledger.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  device   ┌────────────┐  face   ┌────────────┐
//! │  Selector  │──────────▶│ Dispatcher │────────▶│   Ledger   │──▶ SQLite
//! │ (15s scan) │           │ (in order) │         │ close+open │
//! └────────────┘           └────────────┘         └────────────┘
//!                                ▲                      ▲
//!                     ┌──────────┴───┐          ┌───────┴──────┐
//!                     │   Catalog    │          │   Shutdown   │
//!                     │ face → label │          │ (q / Ctrl+C) │
//!                     └──────────────┘          └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use facelog::{
//!     DeviceSelector, EffectiveActivitySet, IntervalLedger, Session, Store, SystemClock,
//! };
//! use facelog::device::{DeviceFilter, Transport};
//!
//! let store = Store::open("facelog.db".as_ref())?;
//! let activities = EffectiveActivitySet::load(&store)?;
//! let ledger = IntervalLedger::new(store, SystemClock);
//!
//! let mut transport = Transport::new()?;
//! let selector = DeviceSelector::new(
//!     DeviceFilter::by_name("Timeular ZEI"),
//!     std::time::Duration::from_secs(15),
//! );
//! let mut session = Session::connect(&mut transport, &selector, ledger, activities)?;
//! let quit = facelog::quit::install_quit_listeners()?;
//! session.run(quit.receiver())?;
//! session.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod catalog;
pub mod clock;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod quit;
pub mod report;
pub mod selector;
pub mod session;
pub mod store;

// Re-export key types at crate root for convenience
pub use catalog::EffectiveActivitySet;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use device::{DeviceCandidate, DeviceConnection, DeviceTransport, FaceId};
pub use dispatcher::FaceChangeDispatcher;
pub use error::{TrackerError, TrackerResult};
pub use ledger::{IntervalLedger, LedgerEffect, LedgerPolicy};
pub use quit::QuitSignal;
pub use selector::DeviceSelector;
pub use session::{Session, ShutdownReport};
pub use store::{Store, StoreError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
