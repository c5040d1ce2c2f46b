//! Staged pipeline framework
//!
//! Queue adapter, stage contract, orchestrator state machine, dead-letter
//! sink and the worker pool, independent of what the stages actually do.
//!
//! # Architecture
//!
//! ```text
//! enqueue ──► JobQueueAdapter ──claim──► Orchestrator ──► Stage (extract, load, ...)
//!                  │                         │
//!                  │ max deliveries          ├── JobStore (CAS job record + executions)
//!                  ▼                         ▼
//!            DeadLetterSink ◄──────── retry budget / fatal
//! ```

pub mod dead_letter;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod policy;
pub mod queue;
pub mod stage;
pub mod store;
pub mod types;
pub mod worker;

pub use dead_letter::{DeadLetterSink, DeadLetters};
pub use error::{PipelineError, PipelineResult, StageError};
pub use orchestrator::{ClaimedJob, Orchestrator, StepReport, StepResult};
pub use policy::StagePolicy;
pub use queue::{Enqueued, JobQueueAdapter, QueueBackend};
pub use stage::{Stage, StageContext, StageSet};
pub use store::{CanonicalStore, JobStore, StagingScope};
pub use types::*;
pub use worker::WorkerPool;
