//! Linux pressure stall information (PSI) monitoring.
//!
//! A [`PressureMonitor`] keeps `/proc/pressure/<resource>` open and turns
//! each read into [`PressureRecord`]s. [`PressureMonitor::register_trigger`]
//! arms a kernel threshold trigger on a separate descriptor and returns a
//! [`TriggerNotifier`] that yields one [`Notification::Crossed`] per
//! crossing until it is stopped or its wait keeps failing.
//!
//! ```no_run
//! use psiwatch::{Notification, PressureMonitor, Resource, Scope, Trigger};
//! use std::time::Duration;
//!
//! let mut cpu = PressureMonitor::open(Resource::Cpu)?;
//! let ticker = cpu.register_trigger(Trigger::new(
//!     Scope::Some,
//!     Duration::from_millis(100),
//!     Duration::from_secs(2),
//! ))?;
//! for n in ticker.iter() {
//!     match n {
//!         Notification::Crossed   => println!("{:?}", cpu.snapshot()?),
//!         Notification::Failed(e) => return Err(e),
//!     }
//! }
//! # Ok::<(), psiwatch::PsiError>(())
//! ```

pub mod collectors;
pub mod config;
pub mod error;
pub mod models;
pub mod util;

pub use collectors::kernel::{ProcPressure, PsiFs};
pub use collectors::monitor::PressureMonitor;
pub use collectors::notifier::{Notification, NotifierOptions, StopHandle, TriggerNotifier};
pub use error::PsiError;
pub use models::pressure::{PressureRecord, Resource, Scope, Trigger};
