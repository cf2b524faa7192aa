/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Double-buffered notification-subscriber registry.
//!
//! Subscribers are kept per event kind in two forms. The *staged* side
//! ([`StagedRegistry`]) is what register/unregister calls mutate, from
//! any task, at any time. The *active* side ([`ActiveLists`]) is what
//! completion delivery walks. The two are reconciled only at the safe
//! point inside promotion, never during delivery, so a list is never
//! mutated while it is being walked.
//!
//! The active side is an arena of subscriber records chained by index,
//! bounded by [`MAX_SUBSCRIBERS`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::event::CompletionNotice;

/// Maximum subscriber records across all event kinds.
pub const MAX_SUBSCRIBERS: usize = 8;

/// Notification categories a task can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A change request completed (successfully or as nothing-to-do).
    Completion = 0,
    /// A deferred lock request was granted.
    LockGrant = 1,
}

impl EventKind {
    /// Number of event kinds.
    pub const COUNT: usize = 2;

    /// All kinds, in index order.
    pub const ALL: [EventKind; Self::COUNT] = [EventKind::Completion, EventKind::LockGrant];

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(u64);

#[derive(Debug, Clone)]
struct StagedSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<CompletionNotice>,
}

/// The mutable side of the registry.
///
/// Register/unregister only touch the staged lists and flip the
/// per-kind divergence flag; the active lists pick the change up at the
/// next safe point.
#[derive(Debug, Default)]
pub struct StagedRegistry {
    lists: DashMap<EventKind, Vec<StagedSubscriber>>,
    dirty: [AtomicBool; EventKind::COUNT],
    next_id: AtomicU64,
}

impl StagedRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber mailbox for `kind` and returns its handle.
    pub fn register(&self, kind: EventKind, tx: mpsc::Sender<CompletionNotice>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lists
            .entry(kind)
            .or_default()
            .push(StagedSubscriber { id, tx });
        self.dirty[kind.index()].store(true, Ordering::Release);
        id
    }

    /// Removes the subscription with handle `id`, whatever its kind.
    ///
    /// Returns `false` if no such subscription exists.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        for kind in EventKind::ALL {
            if let Some(mut list) = self.lists.get_mut(&kind) {
                let before = list.len();
                list.retain(|s| s.id != id);
                if list.len() != before {
                    self.dirty[kind.index()].store(true, Ordering::Release);
                    return true;
                }
            }
        }
        false
    }

    /// Number of staged subscribers for `kind`.
    #[must_use]
    pub fn staged_len(&self, kind: EventKind) -> usize {
        self.lists.get(&kind).map_or(0, |l| l.len())
    }

    /// Consumes the divergence flag for `kind`.
    fn take_dirty(&self, kind: EventKind) -> bool {
        self.dirty[kind.index()].swap(false, Ordering::Acquire)
    }

    fn snapshot(&self, kind: EventKind) -> Vec<StagedSubscriber> {
        self.lists
            .get(&kind)
            .map_or_else(Vec::new, |l| l.value().clone())
    }
}

#[derive(Debug)]
struct ActiveNode {
    id: SubscriberId,
    tx: mpsc::Sender<CompletionNotice>,
    next: Option<usize>,
}

/// The delivery side of the registry: per-kind chains through a fixed
/// arena, rebuilt from the staged side only at the safe point.
#[derive(Debug)]
pub(crate) struct ActiveLists {
    nodes: [Option<ActiveNode>; MAX_SUBSCRIBERS],
    heads: [Option<usize>; EventKind::COUNT],
}

impl Default for ActiveLists {
    fn default() -> Self {
        ActiveLists {
            nodes: Default::default(),
            heads: [None; EventKind::COUNT],
        }
    }
}

impl ActiveLists {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces each out-of-sync kind's active chain with a copy of its
    /// staged list. Called only from the promotion safe point.
    pub(crate) fn sync_stale(&mut self, staged: &StagedRegistry) {
        for kind in EventKind::ALL {
            if staged.take_dirty(kind) {
                self.rebuild(kind, staged.snapshot(kind));
            }
        }
    }

    fn rebuild(&mut self, kind: EventKind, subscribers: Vec<StagedSubscriber>) {
        // Free the old chain.
        let mut cursor = self.heads[kind.index()].take();
        while let Some(index) = cursor {
            cursor = self.nodes[index].take().and_then(|node| node.next);
        }

        // Relink in registration order.
        let mut head = None;
        let mut tail: Option<usize> = None;
        for subscriber in subscribers {
            let Some(free) = self.nodes.iter().position(|n| n.is_none()) else {
                tracing::warn!(
                    ?kind,
                    limit = MAX_SUBSCRIBERS,
                    "subscriber arena full, remaining staged entries not activated",
                );
                break;
            };
            self.nodes[free] = Some(ActiveNode {
                id: subscriber.id,
                tx: subscriber.tx,
                next: None,
            });
            match tail {
                Some(t) => {
                    if let Some(node) = self.nodes[t].as_mut() {
                        node.next = Some(free);
                    }
                }
                None => head = Some(free),
            }
            tail = Some(free);
        }
        self.heads[kind.index()] = head;
    }

    /// Sends `notice` to each active subscriber of `kind`. A full or
    /// closed mailbox is logged and skipped; delivery continues.
    pub(crate) fn deliver(&self, kind: EventKind, notice: CompletionNotice) -> usize {
        let mut delivered = 0;
        let mut cursor = self.heads[kind.index()];
        while let Some(index) = cursor {
            let Some(node) = self.nodes[index].as_ref() else {
                break;
            };
            if let Err(err) = node.tx.try_send(notice) {
                tracing::warn!(?kind, id = ?node.id, %err, "notification send failed");
            } else {
                delivered += 1;
            }
            cursor = node.next;
        }
        delivered
    }

    /// Number of active subscribers for `kind`.
    pub(crate) fn active_len(&self, kind: EventKind) -> usize {
        let mut count = 0;
        let mut cursor = self.heads[kind.index()];
        while let Some(index) = cursor {
            let Some(node) = self.nodes[index].as_ref() else {
                break;
            };
            count += 1;
            cursor = node.next;
        }
        count
    }
}
