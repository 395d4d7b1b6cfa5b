use std::fmt;

/// What happened to a tracking call. Never an error: the host application is not told about
/// observability failures beyond this value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The collector answered 2xx (or test mode short-circuited the call).
    Delivered,
    /// Appended to the in-memory batch buffer; delivery happens on the next flush.
    Buffered,
    /// The attempt failed and the payload now sits in the durable queue.
    Queued { item_id: String },
    Dropped(DropReason),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, DeliveryOutcome::Dropped(_))
    }

    pub fn queued_item_id(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Queued { item_id } => Some(item_id),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The platform blocked the request; it cannot succeed later either.
    Blocked,
    /// The attempt failed and the caller opted out of queueing.
    NotQueued,
    Serialization,
    UnsupportedEndpoint,
    RetriesExhausted,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Blocked => "blocked",
            DropReason::NotQueued => "not-queued",
            DropReason::Serialization => "serialization",
            DropReason::UnsupportedEndpoint => "unsupported-endpoint",
            DropReason::RetriesExhausted => "retries-exhausted",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call delivery flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendOptions {
    pub queue_on_failure: bool,
    pub immediate: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            queue_on_failure: true,
            immediate: false,
        }
    }
}

impl SendOptions {
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Self::default()
        }
    }

    pub fn batched() -> Self {
        Self::default()
    }

    pub fn without_queue(mut self) -> Self {
        self.queue_on_failure = false;
        self
    }
}
