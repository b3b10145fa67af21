//! Per-bucket deduplication.

use crate::models::Buckets;
use itertools::Itertools;
use tracing::{debug, instrument};

/// Drop repeated items inside every (category, region) bucket.
///
/// The first item carrying a given [`dedup_key`](crate::models::NewsItem::dedup_key)
/// wins and relative order is kept. Buckets are deduplicated independently, so
/// the same story may still appear under two regions.
#[instrument(level = "info", skip_all)]
pub fn dedup(buckets: Buckets) -> Buckets {
    let before = buckets.total();
    let out = buckets.map_buckets(|items| items.into_iter().unique_by(|it| it.dedup_key()).collect());
    debug!(before, after = out.total(), "Deduplicated buckets");
    out
}
