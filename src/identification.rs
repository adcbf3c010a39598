//! Identification: inferring solvable decision models from partial
//! knowledge.
//!
//! Identification rules are pure functions from the current design and
//! decision model sets to newly identified decision models plus
//! diagnostic messages. The engine applies every applicable rule once
//! per call against the *current* combined set and merges results by
//! set union; the driving loop repeats the call, accumulating models,
//! until a call yields nothing new. Rules must be confluent: the fixed
//! point may not depend on application order. A rule that cannot
//! identify anything reports diagnostics, never an error; only a
//! malformed model escalates as a hard failure.

use std::sync::Arc;

use tracing::debug;

use crate::errors::ModelError;
use crate::types::{
    contains_decision_model, downcast_decision, AperiodicAsynchronousDataflow,
    AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore,
    AperiodicAsynchronousDataflowToPartitionedTiledMulticore, DecisionModel, DesignModel,
    InstrumentedComputationTimes, InstrumentedMemoryRequirements, MappingVariables,
    MemoryMappableMultiCore, OpaqueDecisionModel, PartitionedMemoryMappableMulticore,
    PartitionedTiledMulticore, RuntimesAndProcessors, TiledMultiCore,
};

/// Newly identified models and accumulated diagnostics, or a
/// contract-violation failure.
pub type IdentificationResult = Result<(Vec<Arc<dyn DecisionModel>>, Vec<String>), ModelError>;

/// A pure identification function.
pub type IdentificationRuleFn =
    fn(&[Arc<dyn DesignModel>], &[Arc<dyn DecisionModel>]) -> IdentificationResult;

/// An identification rule with its declared input interest.
///
/// The interest is an optimization hint for the engine, not a hard
/// filter; skipping an inapplicable rule must never change the fixed
/// point.
pub enum IdentificationRule {
    /// Only reads design models.
    DesignModelOnly(IdentificationRuleFn),
    /// Only reads decision models.
    DecisionModelOnly(IdentificationRuleFn),
    /// Reads specific decision model categories.
    SpecificDecisionModels(Vec<String>, IdentificationRuleFn),
    /// Reads anything.
    Generic(IdentificationRuleFn),
}

impl IdentificationRule {
    fn applicable(
        &self,
        design_models: &[Arc<dyn DesignModel>],
        decision_models: &[Arc<dyn DecisionModel>],
    ) -> bool {
        match self {
            Self::DesignModelOnly(_) => !design_models.is_empty(),
            Self::DecisionModelOnly(_) => !decision_models.is_empty(),
            Self::SpecificDecisionModels(categories, _) => categories
                .iter()
                .all(|c| decision_models.iter().any(|m| &m.category() == c)),
            Self::Generic(_) => true,
        }
    }

    fn function(&self) -> IdentificationRuleFn {
        match self {
            Self::DesignModelOnly(f)
            | Self::DecisionModelOnly(f)
            | Self::SpecificDecisionModels(_, f)
            | Self::Generic(f) => *f,
        }
    }
}

/// Applies a rule set once per call.
pub struct IdentificationEngine {
    rules: Vec<IdentificationRule>,
}

impl IdentificationEngine {
    /// An engine over an explicit rule list.
    pub fn new(rules: Vec<IdentificationRule>) -> Self {
        Self { rules }
    }

    /// The engine with every rule shipped by this crate.
    pub fn standard() -> Self {
        Self::new(vec![
            IdentificationRule::DecisionModelOnly(identify_typed_from_opaque),
            IdentificationRule::SpecificDecisionModels(
                vec![
                    "RuntimesAndProcessors".to_string(),
                    "MemoryMappableMultiCore".to_string(),
                ],
                identify_partitioned_memory_mappable_multicore,
            ),
            IdentificationRule::SpecificDecisionModels(
                vec![
                    "RuntimesAndProcessors".to_string(),
                    "TiledMultiCore".to_string(),
                ],
                identify_partitioned_tiled_multicore,
            ),
            IdentificationRule::SpecificDecisionModels(
                vec![
                    "AperiodicAsynchronousDataflow".to_string(),
                    "PartitionedMemoryMappableMulticore".to_string(),
                    "InstrumentedComputationTimes".to_string(),
                    "InstrumentedMemoryRequirements".to_string(),
                ],
                identify_aadpmmm,
            ),
            IdentificationRule::SpecificDecisionModels(
                vec![
                    "AperiodicAsynchronousDataflow".to_string(),
                    "PartitionedTiledMulticore".to_string(),
                    "InstrumentedComputationTimes".to_string(),
                    "InstrumentedMemoryRequirements".to_string(),
                ],
                identify_aadptm,
            ),
        ])
    }

    /// Apply every applicable rule once against the current model set.
    ///
    /// Returns the deduplicated delta of decision models not already
    /// in the working set, plus all diagnostics.
    pub fn identify(
        &self,
        design_models: &[Arc<dyn DesignModel>],
        decision_models: &[Arc<dyn DecisionModel>],
    ) -> IdentificationResult {
        let mut identified: Vec<Arc<dyn DecisionModel>> = Vec::new();
        let mut messages = Vec::new();
        for rule in &self.rules {
            if !rule.applicable(design_models, decision_models) {
                continue;
            }
            let (models, mut rule_messages) = rule.function()(design_models, decision_models)?;
            for model in models {
                if !contains_decision_model(decision_models, &model)
                    && !contains_decision_model(&identified, &model)
                {
                    identified.push(model);
                }
            }
            messages.append(&mut rule_messages);
        }
        Ok((identified, messages))
    }
}

/// Drive an engine to its identification fixed point.
///
/// Repeats [`IdentificationEngine::identify`], folding each delta into
/// the working set, until a call produces nothing new. Returns the
/// accumulated working set and all diagnostics.
pub fn run_to_fixed_point(
    engine: &IdentificationEngine,
    design_models: &[Arc<dyn DesignModel>],
    initial_decision_models: &[Arc<dyn DecisionModel>],
) -> IdentificationResult {
    let mut working: Vec<Arc<dyn DecisionModel>> = initial_decision_models.to_vec();
    let mut messages = Vec::new();
    let mut step = 0u32;
    loop {
        let (delta, mut step_messages) = engine.identify(design_models, &working)?;
        messages.append(&mut step_messages);
        let before = working.len();
        for model in delta {
            if !contains_decision_model(&working, &model) {
                working.push(model);
            }
        }
        debug!(step, total = working.len(), "identification step");
        step += 1;
        if working.len() == before {
            break;
        }
    }
    Ok((working, messages))
}

/// Recover typed decision models from opaque wire carriers.
///
/// Every known category is tried; carriers of unknown categories are
/// skipped silently. A carrier without a body is reported as a
/// diagnostic, while a body that fails to decode for its claimed
/// category is a malformed-model failure.
pub fn identify_typed_from_opaque(
    _design_models: &[Arc<dyn DesignModel>],
    decision_models: &[Arc<dyn DecisionModel>],
) -> IdentificationResult {
    let mut identified: Vec<Arc<dyn DecisionModel>> = Vec::new();
    let mut messages = Vec::new();
    for model in decision_models {
        let Some(opaque) = downcast_decision::<OpaqueDecisionModel>(model) else {
            continue;
        };
        if opaque.body_json.is_none() && opaque.body_cbor.is_none() {
            messages.push(format!(
                "opaque decision model {} carries no body to recover",
                opaque.category
            ));
            continue;
        }
        let recovered: Option<Arc<dyn DecisionModel>> = match opaque.category.as_str() {
            "AperiodicAsynchronousDataflow" => Some(Arc::new(
                opaque.body_as::<AperiodicAsynchronousDataflow>()?,
            )),
            "MemoryMappableMultiCore" => {
                Some(Arc::new(opaque.body_as::<MemoryMappableMultiCore>()?))
            }
            "TiledMultiCore" => Some(Arc::new(opaque.body_as::<TiledMultiCore>()?)),
            "RuntimesAndProcessors" => Some(Arc::new(opaque.body_as::<RuntimesAndProcessors>()?)),
            "InstrumentedComputationTimes" => Some(Arc::new(
                opaque.body_as::<InstrumentedComputationTimes>()?,
            )),
            "InstrumentedMemoryRequirements" => Some(Arc::new(
                opaque.body_as::<InstrumentedMemoryRequirements>()?,
            )),
            "PartitionedMemoryMappableMulticore" => Some(Arc::new(
                opaque.body_as::<PartitionedMemoryMappableMulticore>()?,
            )),
            "PartitionedTiledMulticore" => {
                Some(Arc::new(opaque.body_as::<PartitionedTiledMulticore>()?))
            }
            "AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore" => {
                Some(Arc::new(opaque.body_as::<
                    AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore,
                >()?))
            }
            "AperiodicAsynchronousDataflowToPartitionedTiledMulticore" => {
                Some(Arc::new(opaque.body_as::<
                    AperiodicAsynchronousDataflowToPartitionedTiledMulticore,
                >()?))
            }
            _ => None,
        };
        if let Some(model) = recovered {
            identified.push(model);
        }
    }
    Ok((identified, messages))
}

/// Compose a memory-mappable platform with a one-to-one runtime
/// partition.
pub fn identify_partitioned_memory_mappable_multicore(
    _design_models: &[Arc<dyn DesignModel>],
    decision_models: &[Arc<dyn DecisionModel>],
) -> IdentificationResult {
    let mut identified: Vec<Arc<dyn DecisionModel>> = Vec::new();
    let mut messages = Vec::new();
    for runtime_model in decision_models {
        let Some(runtimes) = downcast_decision::<RuntimesAndProcessors>(runtime_model) else {
            continue;
        };
        if !runtimes.is_partitioned() {
            messages.push(
                "runtimes and processors are not in one-to-one correspondence".to_string(),
            );
            continue;
        }
        for platform_model in decision_models {
            let Some(hardware) = downcast_decision::<MemoryMappableMultiCore>(platform_model)
            else {
                continue;
            };
            identified.push(Arc::new(PartitionedMemoryMappableMulticore {
                hardware: hardware.clone(),
                runtimes: runtimes.clone(),
            }));
        }
    }
    Ok((identified, messages))
}

/// Compose a tiled platform with a one-to-one runtime partition.
pub fn identify_partitioned_tiled_multicore(
    _design_models: &[Arc<dyn DesignModel>],
    decision_models: &[Arc<dyn DecisionModel>],
) -> IdentificationResult {
    let mut identified: Vec<Arc<dyn DecisionModel>> = Vec::new();
    let mut messages = Vec::new();
    for runtime_model in decision_models {
        let Some(runtimes) = downcast_decision::<RuntimesAndProcessors>(runtime_model) else {
            continue;
        };
        if !runtimes.is_partitioned() {
            messages.push(
                "runtimes and processors are not in one-to-one correspondence".to_string(),
            );
            continue;
        }
        for platform_model in decision_models {
            let Some(hardware) = downcast_decision::<TiledMultiCore>(platform_model) else {
                continue;
            };
            identified.push(Arc::new(PartitionedTiledMulticore {
                hardware: hardware.clone(),
                runtimes: runtimes.clone(),
            }));
        }
    }
    Ok((identified, messages))
}

/// Check that every application process can execute somewhere on the
/// platform, escalating a fully instrumented but unplaceable process.
fn check_placeable(
    apps: &[AperiodicAsynchronousDataflow],
    times: &InstrumentedComputationTimes,
    processing_elements: &[String],
) -> Result<bool, ModelError> {
    for app in apps {
        for process in &app.processes {
            if !times.processes.contains(process) {
                // Instrumentation for another application set.
                return Ok(false);
            }
            let placeable = processing_elements
                .iter()
                .any(|pe| times.worst_execution_time_secs(process, pe).is_some());
            if !placeable {
                return Err(ModelError::MissingExecutionTime {
                    process: process.clone(),
                });
            }
        }
    }
    Ok(true)
}

/// Identify the explorable composite over a partitioned
/// memory-mappable multicore.
pub fn identify_aadpmmm(
    _design_models: &[Arc<dyn DesignModel>],
    decision_models: &[Arc<dyn DecisionModel>],
) -> IdentificationResult {
    let mut identified: Vec<Arc<dyn DecisionModel>> = Vec::new();
    let mut messages = Vec::new();
    let apps: Vec<AperiodicAsynchronousDataflow> = decision_models
        .iter()
        .filter_map(downcast_decision::<AperiodicAsynchronousDataflow>)
        .cloned()
        .collect();
    if apps.is_empty() {
        return Ok((identified, messages));
    }
    for platform_model in decision_models {
        let Some(platform) =
            downcast_decision::<PartitionedMemoryMappableMulticore>(platform_model)
        else {
            continue;
        };
        let pes: Vec<String> = platform.hardware.processing_elems.iter().cloned().collect();
        for times_model in decision_models {
            let Some(times) = downcast_decision::<InstrumentedComputationTimes>(times_model)
            else {
                continue;
            };
            if !check_placeable(&apps, times, &pes)? {
                messages.push(
                    "computation times do not cover the dataflow processes".to_string(),
                );
                continue;
            }
            for requirements_model in decision_models {
                let Some(requirements) =
                    downcast_decision::<InstrumentedMemoryRequirements>(requirements_model)
                else {
                    continue;
                };
                identified.push(Arc::new(
                    AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore {
                        aperiodic_asynchronous_dataflows: apps.clone(),
                        partitioned_mem_mappable_multicore: platform.clone(),
                        instrumented_computation_times: times.clone(),
                        instrumented_memory_requirements: requirements.clone(),
                        variables: MappingVariables::empty(),
                    },
                ));
            }
        }
    }
    Ok((identified, messages))
}

/// Identify the explorable composite over a partitioned tiled
/// multicore.
pub fn identify_aadptm(
    _design_models: &[Arc<dyn DesignModel>],
    decision_models: &[Arc<dyn DecisionModel>],
) -> IdentificationResult {
    let mut identified: Vec<Arc<dyn DecisionModel>> = Vec::new();
    let mut messages = Vec::new();
    let apps: Vec<AperiodicAsynchronousDataflow> = decision_models
        .iter()
        .filter_map(downcast_decision::<AperiodicAsynchronousDataflow>)
        .cloned()
        .collect();
    if apps.is_empty() {
        return Ok((identified, messages));
    }
    for platform_model in decision_models {
        let Some(platform) = downcast_decision::<PartitionedTiledMulticore>(platform_model)
        else {
            continue;
        };
        let pes = platform.hardware.processors.clone();
        for times_model in decision_models {
            let Some(times) = downcast_decision::<InstrumentedComputationTimes>(times_model)
            else {
                continue;
            };
            if !check_placeable(&apps, times, &pes)? {
                messages.push(
                    "computation times do not cover the dataflow processes".to_string(),
                );
                continue;
            }
            for requirements_model in decision_models {
                let Some(requirements) =
                    downcast_decision::<InstrumentedMemoryRequirements>(requirements_model)
                else {
                    continue;
                };
                identified.push(Arc::new(
                    AperiodicAsynchronousDataflowToPartitionedTiledMulticore {
                        aperiodic_asynchronous_dataflows: apps.clone(),
                        partitioned_tiled_multicore: platform.clone(),
                        instrumented_computation_times: times.clone(),
                        instrumented_memory_requirements: requirements.clone(),
                        variables: MappingVariables::empty(),
                    },
                ));
            }
        }
    }
    Ok((identified, messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    fn ingested_models() -> Vec<Arc<dyn DecisionModel>> {
        let platform = fixtures::two_pe_platform();
        vec![
            Arc::new(fixtures::two_process_app()),
            Arc::new(platform.hardware),
            Arc::new(platform.runtimes),
            Arc::new(fixtures::two_process_times()),
            Arc::new(fixtures::two_process_requirements()),
        ]
    }

    fn categories(models: &[Arc<dyn DecisionModel>]) -> Vec<String> {
        let mut out: Vec<String> = models.iter().map(|m| m.category()).collect();
        out.sort();
        out
    }

    #[test]
    fn test_fixed_point_identifies_composite() {
        let engine = IdentificationEngine::standard();
        let (working, _messages) =
            run_to_fixed_point(&engine, &[], &ingested_models()).unwrap();

        let cats = categories(&working);
        assert!(cats.contains(&"PartitionedMemoryMappableMulticore".to_string()));
        assert!(cats.contains(
            &"AperiodicAsynchronousDataflowToPartitionedMemoryMappableMulticore".to_string()
        ));
    }

    #[test]
    fn test_fixed_point_delta_becomes_empty() {
        let engine = IdentificationEngine::standard();
        let (working, _) = run_to_fixed_point(&engine, &[], &ingested_models()).unwrap();
        let (delta, _) = engine.identify(&[], &working).unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_rule_order_does_not_change_fixed_point() {
        let forward = IdentificationEngine::standard();
        let IdentificationEngine {
            rules: mut reversed_rules,
        } = IdentificationEngine::standard();
        reversed_rules.reverse();
        let backward = IdentificationEngine::new(reversed_rules);

        let (a, _) = run_to_fixed_point(&forward, &[], &ingested_models()).unwrap();
        let (b, _) = run_to_fixed_point(&backward, &[], &ingested_models()).unwrap();
        assert_eq!(categories(&a), categories(&b));
    }

    #[test]
    fn test_recovers_typed_from_opaque() {
        let app = fixtures::two_process_app();
        let opaque: Arc<dyn DecisionModel> = Arc::new(OpaqueDecisionModel {
            category: app.category(),
            part: app.part(),
            body_json: app.body_as_json(),
            body_cbor: None,
        });
        let (identified, _) = identify_typed_from_opaque(&[], &[opaque]).unwrap();
        assert_eq!(identified.len(), 1);
        assert!(
            downcast_decision::<AperiodicAsynchronousDataflow>(&identified[0]).is_some()
        );
    }

    #[test]
    fn test_opaque_without_body_is_diagnostic_not_error() {
        let opaque: Arc<dyn DecisionModel> = Arc::new(OpaqueDecisionModel {
            category: "AperiodicAsynchronousDataflow".to_string(),
            part: Default::default(),
            body_json: None,
            body_cbor: None,
        });
        let (identified, messages) = identify_typed_from_opaque(&[], &[opaque]).unwrap();
        assert!(identified.is_empty());
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_malformed_opaque_body_is_hard_failure() {
        let opaque: Arc<dyn DecisionModel> = Arc::new(OpaqueDecisionModel {
            category: "AperiodicAsynchronousDataflow".to_string(),
            part: Default::default(),
            body_json: Some("{\"not\": \"a dataflow\"}".to_string()),
            body_cbor: None,
        });
        assert!(identify_typed_from_opaque(&[], &[opaque]).is_err());
    }

    #[test]
    fn test_unplaceable_process_is_hard_failure() {
        let mut times = fixtures::two_process_times();
        times.worst_execution_times.remove("A");
        let models: Vec<Arc<dyn DecisionModel>> = vec![
            Arc::new(fixtures::two_process_app()),
            Arc::new(fixtures::two_pe_platform()),
            Arc::new(times),
            Arc::new(fixtures::two_process_requirements()),
        ];
        assert!(matches!(
            identify_aadpmmm(&[], &models),
            Err(ModelError::MissingExecutionTime { .. })
        ));
    }

    #[test]
    fn test_design_model_only_rule_gating() {
        use crate::types::OpaqueDesignModel;

        fn from_design(
            design_models: &[Arc<dyn DesignModel>],
            _decision_models: &[Arc<dyn DecisionModel>],
        ) -> IdentificationResult {
            let identified = design_models
                .iter()
                .map(|d| {
                    Arc::new(OpaqueDecisionModel {
                        category: "FromDesign".to_string(),
                        part: d.elements(),
                        body_json: Some("{}".to_string()),
                        body_cbor: None,
                    }) as Arc<dyn DecisionModel>
                })
                .collect();
            Ok((identified, vec![]))
        }

        let engine =
            IdentificationEngine::new(vec![IdentificationRule::DesignModelOnly(from_design)]);

        // Skipped entirely while no design model is present.
        let (empty, _) = engine.identify(&[], &[]).unwrap();
        assert!(empty.is_empty());

        let design: Arc<dyn DesignModel> = Arc::new(OpaqueDesignModel {
            category: "SomeFormat".to_string(),
            elements: ["x"].iter().map(|s| s.to_string()).collect(),
            body_json: None,
        });
        let (working, _) = run_to_fixed_point(&engine, &[design], &[]).unwrap();
        assert_eq!(working.len(), 1);
        assert_eq!(working[0].category(), "FromDesign");
    }

    #[test]
    fn test_non_partitioned_runtimes_yield_diagnostic() {
        let platform = fixtures::two_pe_platform();
        let mut runtimes = platform.runtimes.clone();
        runtimes.runtime_host.remove("rt1");
        let models: Vec<Arc<dyn DecisionModel>> =
            vec![Arc::new(platform.hardware), Arc::new(runtimes)];
        let (identified, messages) =
            identify_partitioned_memory_mappable_multicore(&[], &models).unwrap();
        assert!(identified.is_empty());
        assert!(!messages.is_empty());
    }
}
