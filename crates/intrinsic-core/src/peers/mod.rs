pub mod cache;
pub mod model;
pub mod selector;
pub mod similarity;

pub use cache::{CacheEntry, InMemoryPeerCache, PeerCache};
pub use model::{
    PeerCandidate, PeerGroup, PeerMultiples, PeerOrigin, PeerRecord, PeerTier, SubjectMetrics,
};
pub use selector::{PeerSelector, PeerUniverse, StaticPeerUniverse};
pub use similarity::SimilarityScore;
