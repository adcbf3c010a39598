//! Model traits, headers, and opaque carriers.
//!
//! A *design model* is an opaque system description produced by an
//! external collaborator; the kernel only sees its category, its covered
//! element identifiers, and a content hash used for deduplication and
//! deterministic ordering. A *decision model* is a typed, partially
//! identified abstraction over one or more design models, exposing the
//! set of elements it covers (its `part`). Both are immutable once
//! constructed; new models are produced, never mutated in place.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash;
use crate::errors::ModelError;

/// Identity header of a design model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignModelHeader {
    /// Category tag of the source format or abstraction.
    pub category: String,
    /// Identifiers of the elements this model describes.
    pub elements: BTreeSet<String>,
}

impl DesignModelHeader {
    /// Content hash over the canonical rendering of this header.
    pub fn content_hash(&self) -> u64 {
        canonical_hash(self)
    }
}

impl PartialOrd for DesignModelHeader {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DesignModelHeader {
    fn cmp(&self, other: &Self) -> Ordering {
        self.content_hash()
            .cmp(&other.content_hash())
            .then_with(|| self.category.cmp(&other.category))
            .then_with(|| self.elements.cmp(&other.elements))
    }
}

/// Identity and coverage header of a decision model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionModelHeader {
    /// Category tag of the concrete decision model shape.
    pub category: String,
    /// Identifiers of the design elements this model covers.
    pub part: BTreeSet<String>,
}

impl DecisionModelHeader {
    /// Partial order by coverage.
    ///
    /// `Greater` means this header covers a strict superset of the
    /// other's elements; equal parts compare `Equal`; disjoint or
    /// overlapping-but-incomparable parts compare as `None`.
    pub fn coverage_cmp(&self, other: &Self) -> Option<Ordering> {
        let superset = other.part.is_subset(&self.part);
        let subset = self.part.is_subset(&other.part);
        match (superset, subset) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

/// An opaque system description ingested from an external collaborator.
///
/// Implementations expose identity only; the kernel never interprets
/// design-model contents beyond the covered element identifiers.
pub trait DesignModel: Send + Sync {
    /// Category tag of the source representation.
    fn category(&self) -> String;

    /// Identifiers of the elements this model describes.
    fn elements(&self) -> BTreeSet<String>;

    /// Identity header for ordering and deduplication.
    fn header(&self) -> DesignModelHeader {
        DesignModelHeader {
            category: self.category(),
            elements: self.elements(),
        }
    }

    /// Structured body, if this model carries one.
    fn body_as_json(&self) -> Option<String> {
        None
    }

    /// Downcast support for rules that understand concrete shapes.
    fn as_any(&self) -> &dyn Any;
}

/// A typed, partially identified abstraction over design models.
///
/// Decision models of different concrete shape legally coexist in one
/// working set; rules and explorers downcast to the shapes they
/// understand and skip the rest silently.
pub trait DecisionModel: Send + Sync {
    /// Category tag of this decision model shape.
    fn category(&self) -> String;

    /// The set of design-element identifiers this model covers.
    fn part(&self) -> BTreeSet<String>;

    /// Identity and coverage header.
    fn header(&self) -> DecisionModelHeader {
        DecisionModelHeader {
            category: self.category(),
            part: self.part(),
        }
    }

    /// Structured body as JSON, if representable.
    fn body_as_json(&self) -> Option<String> {
        None
    }

    /// Downcast support for rules that understand concrete shapes.
    fn as_any(&self) -> &dyn Any;

    /// Whether this model covers a strict superset of another's part.
    fn dominates(&self, other: &dyn DecisionModel) -> bool {
        matches!(
            self.header().coverage_cmp(&other.header()),
            Some(Ordering::Greater)
        )
    }
}

impl PartialEq<dyn DecisionModel> for dyn DecisionModel {
    fn eq(&self, other: &dyn DecisionModel) -> bool {
        self.category() == other.category()
            && self.part() == other.part()
            && self.body_as_json() == other.body_as_json()
    }
}

impl PartialEq<dyn DesignModel> for dyn DesignModel {
    fn eq(&self, other: &dyn DesignModel) -> bool {
        self.category() == other.category()
            && self.elements() == other.elements()
            && self.body_as_json() == other.body_as_json()
    }
}

/// Downcast a shared decision model to a concrete shape.
///
/// Returns `None` on category mismatch so rules can skip silently.
pub fn downcast_decision<T: 'static>(model: &Arc<dyn DecisionModel>) -> Option<&T> {
    model.as_any().downcast_ref::<T>()
}

/// Downcast a shared design model to a concrete shape.
pub fn downcast_design<T: 'static>(model: &Arc<dyn DesignModel>) -> Option<&T> {
    model.as_any().downcast_ref::<T>()
}

/// Whether a working set already contains an equal decision model.
pub fn contains_decision_model(
    models: &[Arc<dyn DecisionModel>],
    candidate: &Arc<dyn DecisionModel>,
) -> bool {
    models.iter().any(|m| m.as_ref() == candidate.as_ref())
}

/// Whether a working set already contains an equal design model.
pub fn contains_design_model(
    models: &[Arc<dyn DesignModel>],
    candidate: &Arc<dyn DesignModel>,
) -> bool {
    models.iter().any(|m| m.as_ref() == candidate.as_ref())
}

/// A design model whose body the kernel round-trips without interpreting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueDesignModel {
    /// Category tag of the source representation.
    pub category: String,
    /// Identifiers of the elements this model describes.
    pub elements: BTreeSet<String>,
    /// Opaque JSON body, if any.
    pub body_json: Option<String>,
}

impl OpaqueDesignModel {
    /// Wrap an arbitrary design model into an opaque carrier.
    pub fn from_model(model: &dyn DesignModel) -> Self {
        Self {
            category: model.category(),
            elements: model.elements(),
            body_json: model.body_as_json(),
        }
    }
}

impl DesignModel for OpaqueDesignModel {
    fn category(&self) -> String {
        self.category.clone()
    }

    fn elements(&self) -> BTreeSet<String> {
        self.elements.clone()
    }

    fn body_as_json(&self) -> Option<String> {
        self.body_json.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A decision model carried across the wire with an uninterpreted body.
///
/// Collaborators exchange decision models as a category, a covered
/// element set, and an optional structured body in CBOR and/or JSON.
/// Known categories can be recovered into typed models with
/// [`OpaqueDecisionModel::body_as`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueDecisionModel {
    /// Claimed decision model category.
    pub category: String,
    /// Covered element identifiers.
    pub part: BTreeSet<String>,
    /// Body encoded as JSON, if present.
    pub body_json: Option<String>,
    /// Body encoded as CBOR, if present.
    pub body_cbor: Option<Vec<u8>>,
}

impl OpaqueDecisionModel {
    /// Wrap a typed decision model into an opaque carrier.
    pub fn from_model(model: &dyn DecisionModel) -> Self {
        Self {
            category: model.category(),
            part: model.part(),
            body_json: model.body_as_json(),
            body_cbor: None,
        }
    }

    /// Decode the body into a typed shape, CBOR before JSON.
    ///
    /// The first succeeding decoder wins. Returns a
    /// [`ModelError::MalformedBody`] when a body is present but decodes
    /// into neither encoding, and when no body is present at all.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ModelError> {
        if let Some(cbor) = &self.body_cbor {
            match ciborium::from_reader::<T, _>(cbor.as_slice()) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if self.body_json.is_none() {
                        return Err(ModelError::MalformedBody {
                            category: self.category.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        if let Some(json) = &self.body_json {
            return serde_json::from_str(json).map_err(|e| ModelError::MalformedBody {
                category: self.category.clone(),
                reason: e.to_string(),
            });
        }
        Err(ModelError::MalformedBody {
            category: self.category.clone(),
            reason: "no body present".to_string(),
        })
    }
}

impl DecisionModel for OpaqueDecisionModel {
    fn category(&self) -> String {
        self.category.clone()
    }

    fn part(&self) -> BTreeSet<String> {
        self.part.clone()
    }

    fn body_as_json(&self) -> Option<String> {
        self.body_json.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
