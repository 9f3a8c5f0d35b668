//! Config (SPEC_FULL.md §2.H): `property.txt` key/value loading and
//! `conf/attributes.json` field declarations. Grounded on
//! `supul::impl::property.hpp`/`supul::type::attributes` for the shape and
//! defaults, ported onto `serde_json` (the crate the corpus reaches for
//! JSON, e.g. the teacher's own save layer) rather than a hand-rolled parser.

pub mod attributes;
pub mod property;

pub use attributes::Attributes;
pub use property::Property;

/// Resolved model thresholds (spec §6 `property.txt` keys), with the
/// defaults spec.md §6 documents.
#[derive(Debug, Clone, Copy)]
pub struct ModelConfig {
    pub weak_accuracy: f64,
    pub weak_total_count: i64,
    pub chunk_limit: Option<ChunkLimit>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkLimit {
    pub lower_bound: i64,
    pub upper_bound: i64,
}

impl ModelConfig {
    pub fn from_property(property: &Property) -> Self {
        let chunk_limit = if property.get_bool("limit.chunk.use", false) {
            Some(ChunkLimit {
                lower_bound: property.get_i64("limit.chunk.instance_lower_bound", 0),
                upper_bound: property.get_i64("limit.chunk.instance_upper_bound", i64::MAX),
            })
        } else {
            None
        };
        Self {
            weak_accuracy: property.get_f64("model.weak_treenode_condition.accuracy", 0.8),
            weak_total_count: property.get_i64("model.weak_treenode_condition.total_count", 5),
            chunk_limit,
        }
    }
}
