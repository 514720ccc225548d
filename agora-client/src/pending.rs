use std::collections::VecDeque;

use crate::api::{Message, MessageId, Time};

/// One optimistic mutation applied locally and still awaiting its
/// authoritative echo from the store. Each entry carries enough of the
/// previous state to undo itself if the write is confirmed to have
/// failed.
#[derive(Clone, Debug)]
pub(crate) enum PendingOp {
    Send {
        id: MessageId,
    },
    Edit {
        id: MessageId,
        prev_text: String,
        prev_created_at: Time,
    },
    Delete {
        id: MessageId,
        index: usize,
        message: Message,
    },
    React {
        id: MessageId,
        emoji: String,
        user: String,
    },
}

impl PendingOp {
    pub(crate) fn message_id(&self) -> MessageId {
        match self {
            PendingOp::Send { id }
            | PendingOp::Edit { id, .. }
            | PendingOp::Delete { id, .. }
            | PendingOp::React { id, .. } => *id,
        }
    }
}

/// Queue of in-flight optimistic mutations, keyed by message id.
/// push_back on submit, retired front-to-back as echoes arrive.
#[derive(Debug, Default)]
pub(crate) struct PendingOps(VecDeque<PendingOp>);

impl PendingOps {
    pub(crate) fn new() -> PendingOps {
        PendingOps(VecDeque::new())
    }

    pub(crate) fn push(&mut self, op: PendingOp) {
        self.0.push_back(op);
    }

    /// Removes and returns the oldest entry matching `pred`.
    pub(crate) fn retire(&mut self, pred: impl Fn(&PendingOp) -> bool) -> Option<PendingOp> {
        let idx = self.0.iter().position(pred)?;
        self.0.remove(idx)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}
