//! Prometheus metrics for the PNS indexer.

use metrics::{
    counter,
    gauge,
};

/// Record the timestamp of the latest feed item the indexer has applied.
///
/// Committed as a `Gauge`: `pns_indexer_feed_timestamp`
pub fn set_feed_timestamp(timestamp: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("pns_indexer_feed_timestamp").set(timestamp as f64);
}

/// Record how many decoded events the indexer has applied.
///
/// Committed as a `Counter`: `pns_indexer_events_indexed_total`
pub fn record_events_indexed(count: u64) {
    if count > 0 {
        counter!("pns_indexer_events_indexed_total").increment(count);
    }
}

/// Record how many traced calls the indexer has applied.
///
/// Committed as a `Counter`: `pns_indexer_calls_indexed_total`
pub fn record_calls_indexed(count: u64) {
    if count > 0 {
        counter!("pns_indexer_calls_indexed_total").increment(count);
    }
}
