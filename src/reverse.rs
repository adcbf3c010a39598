//! Reverse identification: projecting solved decision models back
//! onto design models.
//!
//! Reverse rules are independent, side-effect-free functions; the
//! engine is simply the union of their outputs. No fixed point is
//! needed, reverse identification is single-pass by construction.
//! Each rule filters its inputs down to the concrete shapes it
//! understands and skips everything else silently.

use std::sync::Arc;

use tracing::debug;

use crate::types::{
    contains_design_model, downcast_decision,
    AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore,
    AperiodicAsynchronousDataflowToPartitionedTiledMulticore, DecisionModel, DesignModel,
    MappingVariables, OpaqueDesignModel,
};

/// A pure reverse identification function.
pub type ReverseIdentificationRuleFn =
    fn(&[Arc<dyn DecisionModel>], &[Arc<dyn DesignModel>]) -> Vec<Arc<dyn DesignModel>>;

/// Applies every reverse rule and unions the outputs.
pub struct ReverseIdentificationEngine {
    rules: Vec<ReverseIdentificationRuleFn>,
}

impl ReverseIdentificationEngine {
    /// An engine over an explicit rule list.
    pub fn new(rules: Vec<ReverseIdentificationRuleFn>) -> Self {
        Self { rules }
    }

    /// The engine with every reverse rule shipped by this crate.
    pub fn standard() -> Self {
        Self::new(vec![
            reverse_mapped_memory_mappable_multicore,
            reverse_mapped_tiled_multicore,
        ])
    }

    /// Project solved decision models onto new design models.
    pub fn reverse_identify(
        &self,
        solved_decision_models: &[Arc<dyn DecisionModel>],
        design_models: &[Arc<dyn DesignModel>],
    ) -> Vec<Arc<dyn DesignModel>> {
        let mut reversed: Vec<Arc<dyn DesignModel>> = Vec::new();
        for rule in &self.rules {
            for model in rule(solved_decision_models, design_models) {
                if !contains_design_model(&reversed, &model) {
                    reversed.push(model);
                }
            }
        }
        debug!(produced = reversed.len(), "reverse identification pass");
        reversed
    }
}

#[derive(serde::Serialize)]
struct SolvedAnnotations<'a> {
    #[serde(flatten)]
    variables: &'a MappingVariables,
    process_minimum_throughput: std::collections::BTreeMap<&'a String, f64>,
}

fn annotations_body(
    variables: &MappingVariables,
    apps: &[crate::types::AperiodicAsynchronousDataflow],
) -> Option<String> {
    let process_minimum_throughput = apps
        .iter()
        .flat_map(|app| app.process_minimum_throughput.iter())
        .map(|(process, &throughput)| (process, throughput))
        .collect();
    serde_json::to_string(&SolvedAnnotations {
        variables,
        process_minimum_throughput,
    })
    .ok()
}

/// Project solved memory-mappable composites into design models
/// carrying the mapping, scheduling, and reservation decisions.
///
/// The produced design model is opaque to the kernel; format bridges
/// owned by collaborators merge its annotations into their native
/// representations.
pub fn reverse_mapped_memory_mappable_multicore(
    solved_decision_models: &[Arc<dyn DecisionModel>],
    _design_models: &[Arc<dyn DesignModel>],
) -> Vec<Arc<dyn DesignModel>> {
    solved_decision_models
        .iter()
        .filter_map(
            downcast_decision::<AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore>,
        )
        .filter(|solved| !solved.variables.is_empty())
        .map(|solved| {
            Arc::new(OpaqueDesignModel {
                category: "MappedAperiodicAsynchronousDataflow".to_string(),
                elements: solved.part(),
                body_json: annotations_body(
                    &solved.variables,
                    &solved.aperiodic_asynchronous_dataflows,
                ),
            }) as Arc<dyn DesignModel>
        })
        .collect()
}

/// Project solved tiled composites into design models carrying the
/// mapping, scheduling, and reservation decisions.
pub fn reverse_mapped_tiled_multicore(
    solved_decision_models: &[Arc<dyn DecisionModel>],
    _design_models: &[Arc<dyn DesignModel>],
) -> Vec<Arc<dyn DesignModel>> {
    solved_decision_models
        .iter()
        .filter_map(downcast_decision::<AperiodicAsynchronousDataflowToPartitionedTiledMulticore>)
        .filter(|solved| !solved.variables.is_empty())
        .map(|solved| {
            Arc::new(OpaqueDesignModel {
                category: "MappedAperiodicAsynchronousDataflow".to_string(),
                elements: solved.part(),
                body_json: annotations_body(
                    &solved.variables,
                    &solved.aperiodic_asynchronous_dataflows,
                ),
            }) as Arc<dyn DesignModel>
        })
        .collect()
}
