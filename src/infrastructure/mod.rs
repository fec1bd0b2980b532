//! Infrastructure layer - Backends, persistence and services

pub mod embedding;
pub mod logging;
pub mod observability;
pub mod retrieval;
pub mod semantic_cache;
pub mod services;
pub mod vector_index;
