//! Classification and consolidation policy: turning raw text into a
//! salience decision, a canonical form, and (eventually) long-term memories.

pub mod canonical;
pub mod consolidation;
pub mod salience;

pub use canonical::{canonicalize, extract_keywords};
pub use consolidation::{consolidate_events, ConsolidatedItem, ConsolidationMode};
pub use salience::{classify_observation, ObserveDecision};
