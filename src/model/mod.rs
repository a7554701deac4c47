//! # Crawl Data Model
//!
//! DTOs that cross every boundary: session ↔ resolver ↔ locator ↔ caller.
//!
//! Design rule: this module is pure data. No I/O, no state, no async.

pub mod value;
pub mod graph;
pub mod entity;
pub mod rank;
pub mod competitor;

pub use value::{GraphValue, REF_FIELD};
pub use graph::{FieldMap, GraphKey, NormalizedGraph, Resolution, ROOT_QUERY};
pub use entity::{RankedEntity, global_rank};
pub use rank::RankResult;
pub use competitor::{CompetitorRecord, CompetitorSet, CompetitorSource};
