// League domain: entities, the draft constraint engine, match scoring, and
// stat projections. Everything here is pure; persistence lives in the store.

pub mod draft;
pub mod model;
pub mod scoring;
pub mod stats;
