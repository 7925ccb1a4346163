use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// How an arriving block or fragment was classified.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    /// A plain block (or a fragment's parent) at least one session actively wants.
    Wanted,
    /// Nobody wants the block, or the fragment's parent.
    Unwanted,
    /// A fragment that raised its parent's decoder rank.
    Admitted,
    /// A fragment that was malformed, had no decoder, or carried no new information.
    Rejected,
    /// A fragment whose parent's coded want ended while it was in flight.
    Dropped,
}

/// Metric label for [Outcome].
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Label {
    outcome: Outcome,
}

impl Label {
    pub fn new(outcome: Outcome) -> Self {
        Self { outcome }
    }
}

/// Metrics for the interest engine.
pub struct Metrics {
    /// Number of arriving plain blocks and fragments by outcome
    pub blocks: Family<Label, Counter>,
    /// Number of coded fragments by admission outcome
    pub fragments: Family<Label, Counter>,
    /// Current number of keys with plain interest
    pub keys: Gauge,
    /// Current number of parents with outstanding coded wants
    pub outstanding: Gauge,
    /// Current number of live decoders
    pub decoders: Gauge,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given registry.
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self {
            blocks: Family::default(),
            fragments: Family::default(),
            keys: Gauge::default(),
            outstanding: Gauge::default(),
            decoders: Gauge::default(),
        };
        registry.register(
            "blocks",
            "Number of arriving blocks by outcome",
            metrics.blocks.clone(),
        );
        registry.register(
            "fragments",
            "Number of coded fragments by admission outcome",
            metrics.fragments.clone(),
        );
        registry.register(
            "keys",
            "Current number of keys with plain interest",
            metrics.keys.clone(),
        );
        registry.register(
            "outstanding",
            "Current number of parents with outstanding coded wants",
            metrics.outstanding.clone(),
        );
        registry.register(
            "decoders",
            "Current number of live decoders",
            metrics.decoders.clone(),
        );
        metrics
    }

    pub fn record_blocks(&self, outcome: Outcome, count: usize) {
        if count > 0 {
            self.blocks
                .get_or_create(&Label::new(outcome))
                .inc_by(count as u64);
        }
    }

    pub fn record_fragments(&self, outcome: Outcome, count: usize) {
        if count > 0 {
            self.fragments
                .get_or_create(&Label::new(outcome))
                .inc_by(count as u64);
        }
    }
}
