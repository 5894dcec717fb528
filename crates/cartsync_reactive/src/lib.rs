//! Reactive primitives for cartsync (Layer 1).
//!
//! `cartsync_reactive` provides the building blocks every fallible async
//! boundary in cartsync is expressed with:
//!
//! - [`ActionResult`] / [`ActionError`] - The success/failure contract, with
//!   [`OutcomeExt`] for folding both variants into one value
//! - [`Observable`] - A disposable publish/subscribe cell holding a current value
//! - [`Command`] - A single-flight async action with observable lifecycle state
//!
//! # Example
//!
//! ```
//! use cartsync_reactive::{ActionStatus, Command, Execution};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let load = Command::new0(|| async { Ok::<_, cartsync_reactive::ActionError>(3_u32) });
//!
//! let execution = load.run().await;
//! assert!(matches!(execution, Execution::Completed(Ok(3))));
//! assert_eq!(load.status(), ActionStatus::Succeeded);
//! # });
//! ```
//!
//! # Architecture
//!
//! - **Layer 1** (`cartsync_reactive`, `cartsync_reconcile`): primitives (this crate)
//! - **Layer 2** (`cartsync_migration`): anonymous-to-identified reconciliation

/// Single-flight async commands.
pub mod command;

/// Publish/subscribe cell with a current value.
pub mod observable;

/// Success/failure outcome contract.
pub mod outcome;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::command::{
        ActionState, ActionStatus, Command, Command0, Command1, Execution,
    };
    pub use crate::observable::{Observable, ObservableError, Subscription};
    pub use crate::outcome::{ActionError, ActionResult, OutcomeExt};
}

pub use command::{ActionState, ActionStatus, Command, Command0, Command1, Execution};
pub use observable::{Observable, ObservableError, Subscription};
pub use outcome::{ActionError, ActionResult, OutcomeExt};
