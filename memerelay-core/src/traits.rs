use crate::{CandidatePost, CoreError, DeliveryMethod, SortMode, TopTimeFilter};

/// Listing request for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest<'a> {
    pub source: &'a str,
    pub sort: SortMode,
    pub time_filter: TopTimeFilter,
    pub limit: u32,
}

/// Upstream provider of candidate posts.
pub trait PostSource {
    /// Fetch up to `request.limit` posts in the provider's own order.
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<CandidatePost>, CoreError>;
}

/// Messaging target that posts are relayed to.
pub trait Deliverer {
    async fn deliver(&self, post: &CandidatePost) -> Result<DeliveryMethod, CoreError>;
}
