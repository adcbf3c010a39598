//! Value types of the kernel: models, headers, platforms, solutions.

pub mod composite;
pub mod dataflow;
pub mod instrumentation;
pub mod model;
pub mod platform;
pub mod solution;

pub use composite::{
    AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore,
    AperiodicAsynchronousDataflowToPartitionedTiledMulticore, ExplorationView, MappingVariables,
};
pub use dataflow::{AperiodicAsynchronousDataflow, Job};
pub use instrumentation::{InstrumentedComputationTimes, InstrumentedMemoryRequirements};
pub use model::{
    contains_decision_model, contains_design_model, downcast_decision, downcast_design,
    DecisionModel, DecisionModelHeader, DesignModel, DesignModelHeader, OpaqueDecisionModel,
    OpaqueDesignModel,
};
pub use platform::{
    MemoryMappableMultiCore, PartitionedMemoryMappableMulticore, PartitionedTiledMulticore,
    RuntimesAndProcessors, TiledMultiCore,
};
pub use solution::{ExplorationBidding, ExplorationSolution};
