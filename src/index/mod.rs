pub mod bwt;
pub mod fm;
pub mod sa;
pub mod search;
pub mod seed;

pub use search::{InexactSearch, Query, SearchParams, SearchStats, SeedHit};
pub use seed::{ImmutableSeedIndex, IndexConfig, MutableSeedIndex, SeedIndex, SeedLookup};
