//! Download dispatcher
//!
//! Bounds how many external download operations run at the same time and
//! queues the rest in arrival order. One instance is built at startup and
//! shared (it is cheap to clone) with everything that submits work.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use mediagrab::dispatch::Dispatcher;
//!
//! let dispatcher = Dispatcher::new(3);
//! let handle = dispatcher.submit_with_timeout(Duration::from_secs(120), || async {
//!     Ok::<_, std::io::Error>("/tmp/file.mp4")
//! });
//! println!("{} ahead", dispatcher.queue_depth());
//! let path = handle.await?;
//! ```

mod dispatcher;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherStats, TaskHandle};
