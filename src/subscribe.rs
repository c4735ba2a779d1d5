//! The consensus change feed.
//!
//! Subscribers receive every canonical-path change as an ordered
//! `(reverted, applied)` diff over a bounded blocking channel. A full buffer
//! blocks the producer rather than dropping: losing a diff would desynchronize
//! the subscriber's view of consensus permanently. A subscriber that hangs up
//! (drops its receiver) is pruned on the next broadcast.

use crate::block::Block;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use tracing::debug;

/// Messages buffered per subscriber before the producer blocks.
pub const SUBSCRIBER_BUFFER: usize = 32;

/// One canonical-path change. Within a single change, the reverted blocks
/// (old tip first) precede the applied blocks (oldest first).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusChange {
    pub reverted: Vec<Block>,
    pub applied: Vec<Block>,
}

/// Handle identifying a subscriber, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Subscriber {
    token: SubscriptionToken,
    sender: SyncSender<ConsensusChange>,
}

#[derive(Default)]
pub struct SubscriptionFeed {
    subscribers: Vec<Subscriber>,
    next_token: u64,
}

impl SubscriptionFeed {
    pub fn new() -> SubscriptionFeed {
        SubscriptionFeed::default()
    }

    /// Register a subscriber and deliver its catch-up diff (the canonical
    /// chain from genesis) as the first message.
    pub fn subscribe(
        &mut self,
        catch_up: ConsensusChange,
    ) -> (SubscriptionToken, Receiver<ConsensusChange>) {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        let (sender, receiver) = sync_channel(SUBSCRIBER_BUFFER);
        // The buffer is empty, so the catch-up send cannot block.
        let _ = sender.send(catch_up);
        self.subscribers.push(Subscriber { token, sender });
        (token, receiver)
    }

    /// Drop a subscriber and its buffer.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) {
        self.subscribers.retain(|s| s.token != token);
    }

    /// Deliver one change to every subscriber, in registration order. Blocks
    /// on full buffers; prunes subscribers whose receiver is gone.
    pub fn broadcast(&mut self, change: &ConsensusChange) {
        self.subscribers.retain(|subscriber| {
            match subscriber.sender.send(change.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(token = subscriber.token.0, "dropping hung-up subscriber");
                    false
                }
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
