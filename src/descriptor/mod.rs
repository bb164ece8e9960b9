//! Derived descriptor columns
//!
//! Handlers supplied from outside compute descriptors from parent cells.
//! The [`DescriptorScheduler`] runs them over every record on a worker pool;
//! the owner context integrates finished generations into the table.

pub mod cancel;
pub mod errors;
pub mod handler;
pub mod job;
pub mod scheduler;
pub mod similarity;

pub use cancel::CancellationToken;
pub use errors::{DescriptorError, DescriptorResult};
pub use handler::{
    decode_descriptor, default_similarity, encode_descriptor, AnyDescriptorHandler, Descriptor,
    DescriptorHandler, DescriptorKind, ParentCell, SharedHandler,
};
pub use job::{DescriptorJob, JobReport, JobSnapshot};
pub use scheduler::{DescriptorScheduler, DrainNotifier, GenerationOutcome, GenerationReport};
pub use similarity::SimilarityPool;
