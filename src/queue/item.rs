//! QueueItem: the token that rides the bounded queues between stages.

use serde::{Deserialize, Serialize};

/// One phase's elapsed time, appended as a document item passes each stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub elapsed_ms: u64,
}

/// A pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Extract,
    Transform,
    Publish,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Extract => "extract",
            Phase::Transform => "transform",
            Phase::Publish => "publish",
        }
    }
}

/// An item on a [`crate::queue::BoundedQueue`]: either a document reference
/// carrying its accumulated per-phase timings, or a marker signaling that a
/// phase has finished producing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Document {
        id: String,
        timings: Vec<PhaseTiming>,
    },
    /// Signals that `phase` has produced its last document item.
    Marker { phase: Phase },
}

impl QueueItem {
    pub fn document(id: impl Into<String>) -> Self {
        QueueItem::Document {
            id: id.into(),
            timings: Vec::new(),
        }
    }

    pub fn marker(phase: Phase) -> Self {
        QueueItem::Marker { phase }
    }

    pub fn is_document(&self) -> bool {
        matches!(self, QueueItem::Document { .. })
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, QueueItem::Marker { .. })
    }

    /// True if this item is the marker for `expected_phase`.
    pub fn is_phase_complete(&self, expected_phase: Phase) -> bool {
        matches!(self, QueueItem::Marker { phase } if *phase == expected_phase)
    }

    /// Return a copy of this document item with one more timing appended.
    /// Panics if called on a marker -- callers should check `is_document`
    /// first, mirroring the spec's classify-then-act worker loop.
    pub fn with_timing(&self, phase: Phase, elapsed_ms: u64) -> Self {
        match self {
            QueueItem::Document { id, timings } => {
                let mut timings = timings.clone();
                timings.push(PhaseTiming { phase, elapsed_ms });
                QueueItem::Document {
                    id: id.clone(),
                    timings,
                }
            }
            QueueItem::Marker { .. } => panic!("with_timing called on a marker item"),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            QueueItem::Document { id, .. } => Some(id),
            QueueItem::Marker { .. } => None,
        }
    }
}
