//! Request orchestration
//!
//! Per link: `Resolving -> {OffersShown | DirectFallback} -> Completed | Failed`.
//! Offers are parked in the selection cache until a button press comes back;
//! every download runs through the dispatcher and its temporary file is
//! removed on every exit path.

mod artifact;
pub mod captions;
mod error;
mod orchestrator;

pub use artifact::TempArtifact;
pub use error::FlowError;
pub use orchestrator::{FlowOutcome, FlowSettings, Orchestrator};
