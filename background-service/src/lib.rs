//! The relay loop: fetch and filter candidates, deliver them, remember what
//! was sent, and repeat on a schedule until asked to stop.

pub mod delivery;
pub mod pipeline;
pub mod scheduler;
pub mod shutdown;

#[cfg(test)]
mod tests;

pub use delivery::{deliver_batch, DeliveryReport};
pub use pipeline::{filter_candidates, run_pipeline, PipelineOutput, SourceFailure};
pub use scheduler::{next_run_after, summary_message, RunOutcome, Scheduler, HOUSEKEEPING_INTERVAL};
pub use shutdown::{ShutdownController, ShutdownSignal};
