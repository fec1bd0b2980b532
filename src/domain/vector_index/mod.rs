//! Vector index domain models and traits

mod index;
mod record;

pub use index::{validate_add_inputs, VectorIndex};
pub use record::{
    AddOutcome, IndexStats, Metadata, MetadataFilter, SearchHit, VectorBackend, VectorRecord,
};
