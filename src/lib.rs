//! # dse-kernel
//!
//! Design-space identification and exploration for aperiodic dataflow
//! applications on heterogeneous multicore platforms.
//!
//! Given a heterogeneous description of an application (a job graph
//! with data dependencies) and a candidate hardware platform, the
//! kernel:
//!
//! 1. infers abstract, solvable *decision models* from the raw *design
//!    models* by driving identification rules to a fixed point,
//! 2. searches the combinatorial space of valid mappings, schedules,
//!    and communication reservations for Pareto-optimal trade-offs
//!    between resource usage and throughput, and
//! 3. projects solved decision models back onto design models through
//!    reverse identification.
//!
//! ## Architecture
//!
//! ```text
//! DesignModels → IdentificationEngine → DecisionModels
//!       ↑                                     ↓ (bid, explore)
//! ReverseIdentificationEngine ← ExplorationSolutions ← Explorer
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Models are deduplicated and ordered by canonical content hash
//! - Identification is confluent: rule order does not change the
//!   fixed point
//! - Constraint repair and seeded evolution are reproducible

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod canonical;
pub mod errors;
pub mod explore;
pub mod identification;
pub mod reverse;
pub mod session;
pub mod types;

// Re-exports
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use errors::ModelError;
pub use explore::{
    pick_best_bidding, CancellationToken, EvolutionaryExplorer, ExplorationConfiguration,
    ExplorationPhase, Explorer,
};
pub use identification::{
    run_to_fixed_point, IdentificationEngine, IdentificationResult, IdentificationRule,
};
pub use reverse::ReverseIdentificationEngine;
pub use session::{ExplorationSession, ExplorationSessionRegistry, SolutionStream};
pub use types::{
    AperiodicAsynchronousDataflow,
    AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore,
    AperiodicAsynchronousDataflowToPartitionedTiledMulticore, DecisionModel, DecisionModelHeader,
    DesignModel, DesignModelHeader, ExplorationBidding, ExplorationSolution, ExplorationView,
    InstrumentedComputationTimes, InstrumentedMemoryRequirements, Job, MappingVariables,
    MemoryMappableMultiCore, OpaqueDecisionModel, OpaqueDesignModel,
    PartitionedMemoryMappableMulticore, PartitionedTiledMulticore, RuntimesAndProcessors,
    TiledMultiCore,
};

/// Schema version for all kernel model types.
/// Increment on breaking changes to any serialized shape.
pub const KERNEL_SCHEMA_VERSION: &str = "1.0.0";
