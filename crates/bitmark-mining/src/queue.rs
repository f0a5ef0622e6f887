//! Ancestor-aware priority queue over a mempool snapshot.
//!
//! A transaction whose inputs depend on other pooled transactions is held
//! as an orphan until every ancestor has been emitted; only then does it
//! enter the live heap. Orphans live in an arena indexed by id, with a
//! `dependers` multimap from ancestor txid to waiting orphan ids.

use bitmark_chain::{Hash256, Transaction};
use bitmark_mempool::Mempool;
use bitmark_state::CoinsCache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error};

/// A heap entry: the two ranking keys plus the transaction itself.
#[derive(Debug, Clone)]
pub struct TxPriority {
    /// Coin-age priority.
    pub priority: f64,
    /// Fee per kilobyte of serialized size.
    pub fee_per_kb: f64,
    /// Transaction id.
    pub txid: Hash256,
    /// The transaction.
    pub tx: Arc<Transaction>,
}

#[derive(Debug)]
struct OrphanRecord {
    txid: Hash256,
    tx: Arc<Transaction>,
    priority: f64,
    fee_per_kb: f64,
    waiting_on: HashSet<Hash256>,
}

/// Strict weak ordering: is `a` ranked below `b` under the active mode?
///
/// Fee-dominant mode breaks fee ties on priority; priority-dominant mode
/// breaks priority ties on fee.
fn ranked_below(by_fee: bool, a: &TxPriority, b: &TxPriority) -> bool {
    if by_fee {
        if a.fee_per_kb == b.fee_per_kb {
            a.priority.total_cmp(&b.priority).is_lt()
        } else {
            a.fee_per_kb.total_cmp(&b.fee_per_kb).is_lt()
        }
    } else if a.priority == b.priority {
        a.fee_per_kb.total_cmp(&b.fee_per_kb).is_lt()
    } else {
        a.priority.total_cmp(&b.priority).is_lt()
    }
}

/// The dependency-aware priority queue.
#[derive(Debug, Default)]
pub struct TxPriorityQueue {
    heap: Vec<TxPriority>,
    by_fee: bool,
    orphans: Vec<Option<OrphanRecord>>,
    dependers: HashMap<Hash256, Vec<usize>>,
}

impl TxPriorityQueue {
    /// Build the queue from a mempool snapshot.
    ///
    /// Walks every pooled transaction once, accumulating coin-age priority
    /// from the view and registering orphans for inputs that are still
    /// pooled. Transactions referencing inputs in neither place are
    /// dropped; mempool invariants say that cannot happen.
    pub fn build(
        mempool: &Mempool,
        view: &mut CoinsCache<'_>,
        tip_height: i32,
        now: u64,
        by_fee: bool,
    ) -> Self {
        let mut queue = TxPriorityQueue {
            by_fee,
            ..Default::default()
        };

        for (txid, entry) in mempool.entries() {
            let tx = entry.tx;
            if tx.is_coinbase() || !tx.is_final_at(tip_height + 1, now) {
                continue;
            }

            let mut orphan: Option<usize> = None;
            let mut priority_sum = 0f64;
            let mut total_in = 0i64;
            let mut missing_inputs = false;

            for input in &tx.vin {
                let prevout = input.prevout;
                if !view.have_coins(&prevout.hash) {
                    // Not in the view: either a pooled ancestor or a
                    // genuinely missing input.
                    let Some(value) = mempool.output_value(&prevout.hash, prevout.n) else {
                        error!(tx = %txid, "mempool transaction missing input");
                        debug_assert!(
                            false,
                            "mempool transaction {txid} references an unknown input"
                        );
                        missing_inputs = true;
                        if let Some(id) = orphan.take() {
                            queue.orphans[id] = None;
                        }
                        break;
                    };
                    let id = *orphan.get_or_insert_with(|| {
                        queue.orphans.push(Some(OrphanRecord {
                            txid,
                            tx: Arc::clone(&tx),
                            priority: 0.0,
                            fee_per_kb: 0.0,
                            waiting_on: HashSet::new(),
                        }));
                        queue.orphans.len() - 1
                    });
                    queue.dependers.entry(prevout.hash).or_default().push(id);
                    if let Some(rec) = queue.orphans[id].as_mut() {
                        rec.waiting_on.insert(prevout.hash);
                    }
                    total_in += value;
                    continue;
                }

                let Some(value) = view
                    .coins(&prevout.hash)
                    .and_then(|c| c.outputs.get(prevout.n as usize).cloned().flatten())
                    .map(|o| o.value)
                else {
                    error!(tx = %txid, "mempool transaction spends an unavailable output");
                    debug_assert!(false, "mempool transaction {txid} spends a spent output");
                    missing_inputs = true;
                    if let Some(id) = orphan.take() {
                        queue.orphans[id] = None;
                    }
                    break;
                };
                let coin_height = view
                    .coins(&prevout.hash)
                    .map(|c| c.height)
                    .unwrap_or(tip_height);
                let confirmations = (tip_height - coin_height + 1).max(0);
                priority_sum += value as f64 * confirmations as f64;
                total_in += value;
            }
            if missing_inputs {
                continue;
            }

            let size = tx.serialized_size();
            let priority = tx.compute_priority(priority_sum);
            let fee_per_kb = (total_in - tx.value_out()) as f64 / (size as f64 / 1000.0);

            match orphan {
                Some(id) => {
                    if let Some(rec) = queue.orphans[id].as_mut() {
                        rec.priority = priority;
                        rec.fee_per_kb = fee_per_kb;
                    }
                }
                None => queue.heap.push(TxPriority {
                    priority,
                    fee_per_kb,
                    txid,
                    tx,
                }),
            }
        }

        make_heap(&mut queue.heap, queue.by_fee);
        debug!(
            live = queue.heap.len(),
            orphans = queue.orphans.iter().filter(|o| o.is_some()).count(),
            "built priority queue"
        );
        queue
    }

    /// Pop the top-ranked live transaction.
    pub fn pop(&mut self) -> Option<TxPriority> {
        pop_heap(&mut self.heap, self.by_fee)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether the queue ranks by fee.
    pub fn by_fee(&self) -> bool {
        self.by_fee
    }

    /// Switch the active ordering, rebuilding the heap in place.
    pub fn set_order(&mut self, by_fee: bool) {
        if self.by_fee != by_fee {
            self.by_fee = by_fee;
            make_heap(&mut self.heap, by_fee);
        }
    }

    /// Release protocol: `txid` has been placed; orphans waiting only on it
    /// become live.
    pub fn release_dependents(&mut self, txid: &Hash256) {
        let Some(ids) = self.dependers.remove(txid) else {
            return;
        };
        for id in ids {
            let ready = match self.orphans[id].as_mut() {
                Some(rec) if !rec.waiting_on.is_empty() => {
                    rec.waiting_on.remove(txid);
                    rec.waiting_on.is_empty()
                }
                _ => false,
            };
            if ready {
                if let Some(rec) = self.orphans[id].take() {
                    push_heap(
                        &mut self.heap,
                        self.by_fee,
                        TxPriority {
                            priority: rec.priority,
                            fee_per_kb: rec.fee_per_kb,
                            txid: rec.txid,
                            tx: rec.tx,
                        },
                    );
                }
            }
        }
    }

}

// Binary max-heap primitives over a vector, parameterized on the active
// comparator so an in-place rebuild is a single make_heap call.

fn make_heap(v: &mut [TxPriority], by_fee: bool) {
    if v.len() < 2 {
        return;
    }
    for i in (0..v.len() / 2).rev() {
        sift_down(v, by_fee, i);
    }
}

fn push_heap(v: &mut Vec<TxPriority>, by_fee: bool, item: TxPriority) {
    v.push(item);
    let mut child = v.len() - 1;
    while child > 0 {
        let parent = (child - 1) / 2;
        if ranked_below(by_fee, &v[parent], &v[child]) {
            v.swap(parent, child);
            child = parent;
        } else {
            break;
        }
    }
}

fn pop_heap(v: &mut Vec<TxPriority>, by_fee: bool) -> Option<TxPriority> {
    if v.is_empty() {
        return None;
    }
    let last = v.len() - 1;
    v.swap(0, last);
    let top = v.pop();
    if !v.is_empty() {
        sift_down(v, by_fee, 0);
    }
    top
}

fn sift_down(v: &mut [TxPriority], by_fee: bool, mut parent: usize) {
    loop {
        let left = 2 * parent + 1;
        if left >= v.len() {
            break;
        }
        let mut best = left;
        let right = left + 1;
        if right < v.len() && ranked_below(by_fee, &v[left], &v[right]) {
            best = right;
        }
        if ranked_below(by_fee, &v[parent], &v[best]) {
            v.swap(parent, best);
            parent = best;
        } else {
            break;
        }
    }
}
