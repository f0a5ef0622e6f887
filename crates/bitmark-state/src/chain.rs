//! The active chain index.
//!
//! Block metadata lives in an append-only arena indexed by position; links
//! to predecessors are arena indices rather than pointers, so ancestry
//! walks (including the per-algorithm walk the fork rules need) are plain
//! index chasing.

use crate::error::{StateError, StateResult};
use bitmark_chain::{
    compact_to_target, target_to_compact, version_algo, version_update_ssf, Algo, BlockHeader,
    ChainParams, Hash256,
};
use std::collections::HashMap;
use tracing::debug;

/// Number of ancestor timestamps in the median-time-past window.
const MEDIAN_TIME_SPAN: usize = 11;

/// Metadata for one block on the active chain.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    /// Block hash.
    pub hash: Hash256,
    /// Arena index of the predecessor, if any.
    pub prev: Option<usize>,
    /// Height on the active chain.
    pub height: i32,
    /// Version word (carries the algorithm tag and SSF flag).
    pub version: i32,
    /// Header timestamp.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
}

impl BlockIndex {
    /// Base version with packed fields stripped.
    pub fn base_version(&self) -> i32 {
        self.version & 0xff
    }

    /// Mining algorithm recorded in the version word.
    pub fn algo(&self) -> Algo {
        version_algo(self.version)
    }

    /// Whether this block carries the slow-start update flag.
    pub fn update_ssf(&self) -> bool {
        version_update_ssf(self.version)
    }
}

/// The active chain: an append-only arena of [`BlockIndex`] entries.
#[derive(Debug, Default)]
pub struct ChainIndex {
    entries: Vec<BlockIndex>,
    by_hash: HashMap<Hash256, usize>,
}

impl ChainIndex {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block extending the current tip. Returns its arena index.
    pub fn push(&mut self, hash: Hash256, version: i32, time: u32, bits: u32) -> usize {
        let prev = self.tip_index();
        let height = prev.map(|i| self.entries[i].height + 1).unwrap_or(0);
        let idx = self.entries.len();
        self.entries.push(BlockIndex {
            hash,
            prev,
            height,
            version,
            time,
            bits,
        });
        self.by_hash.insert(hash, idx);
        idx
    }

    /// Entry at an arena index.
    pub fn entry(&self, idx: usize) -> &BlockIndex {
        &self.entries[idx]
    }

    /// Arena index of the tip.
    pub fn tip_index(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }

    /// The tip entry.
    pub fn tip(&self) -> Option<&BlockIndex> {
        self.entries.last()
    }

    /// Hash of the tip.
    pub fn tip_hash(&self) -> Option<Hash256> {
        self.tip().map(|e| e.hash)
    }

    /// Height of the tip, or -1 for an empty chain.
    pub fn height(&self) -> i32 {
        self.tip().map(|e| e.height).unwrap_or(-1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by block hash.
    pub fn index_of(&self, hash: &Hash256) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    /// Nearest strict ancestor of `from` mined with `algo`.
    pub fn pprev_algo(&self, from: usize, algo: Algo) -> Option<usize> {
        let mut cursor = self.entries[from].prev;
        while let Some(idx) = cursor {
            if self.entries[idx].algo() == algo {
                return Some(idx);
            }
            cursor = self.entries[idx].prev;
        }
        None
    }

    /// Median of the last [`MEDIAN_TIME_SPAN`] block times ending at `idx`.
    pub fn median_time_past(&self, idx: usize) -> u64 {
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            if times.len() == MEDIAN_TIME_SPAN {
                break;
            }
            times.push(self.entries[i].time as u64);
            cursor = self.entries[i].prev;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Whether at least `required` of the `window` blocks ending at `start`
    /// carry a base version >= `min_version`.
    pub fn is_super_majority(
        &self,
        min_version: i32,
        start: usize,
        required: u32,
        window: u32,
    ) -> bool {
        let mut found = 0u32;
        let mut cursor = Some(start);
        for _ in 0..window {
            let Some(idx) = cursor else { break };
            if self.entries[idx].base_version() >= min_version {
                found += 1;
                if found >= required {
                    return true;
                }
            }
            cursor = self.entries[idx].prev;
        }
        found >= required
    }

    /// Compact difficulty required for a block of `algo` following `prev`.
    ///
    /// Retargets every block against the spacing of the two most recent
    /// blocks of the same algorithm, clamped to a factor of four. On
    /// networks that allow it, a block arriving more than twice the
    /// per-algorithm spacing late may use the minimum difficulty.
    pub fn next_work_required(
        &self,
        prev: usize,
        params: &ChainParams,
        algo: Algo,
        block_time: u64,
    ) -> u32 {
        let pow_limit = params.pow_limit_bits;

        let last = if self.entries[prev].algo() == algo {
            Some(prev)
        } else {
            self.pprev_algo(prev, algo)
        };
        let Some(last) = last else {
            return pow_limit;
        };

        let spacing = params.algo_spacing();
        if params.allow_min_difficulty
            && block_time > self.entries[last].time as u64 + 2 * spacing
        {
            return pow_limit;
        }

        let Some(prior) = self.pprev_algo(last, algo) else {
            return self.entries[last].bits;
        };

        let actual = (self.entries[last].time.saturating_sub(self.entries[prior].time) as u64)
            .clamp(spacing / 4, spacing * 4)
            .max(1);

        let old_target = compact_to_target(self.entries[last].bits);
        let mut new_target = old_target * actual / spacing;
        let limit = compact_to_target(pow_limit);
        if new_target > limit {
            new_target = limit;
        }
        let bits = target_to_compact(&new_target);
        debug!(
            algo = algo.name(),
            actual,
            spacing,
            bits = format!("{bits:#x}"),
            "retargeted"
        );
        bits
    }

    /// Refresh a header's timestamp: monotone past the predecessor's
    /// median-time-past, tracking the supplied wall clock otherwise.
    pub fn update_time(&self, header: &mut BlockHeader, prev: usize, now: u64) {
        let floor = self.median_time_past(prev) + 1;
        header.time = floor.max(now) as u32;
    }

    /// Ensure the chain is non-empty, returning the tip index.
    pub fn require_tip(&self) -> StateResult<usize> {
        self.tip_index()
            .ok_or_else(|| StateError::InvalidBlock("empty chain has no tip".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitmark_chain::{sha256d, BLOCK_VERSION_DEFAULT};

    fn version_for(algo: Algo) -> i32 {
        let mut header = BlockHeader {
            version: BLOCK_VERSION_DEFAULT,
            ..Default::default()
        };
        header.set_algo(algo);
        header.version
    }

    fn build_chain(algos: &[Algo]) -> ChainIndex {
        let mut chain = ChainIndex::new();
        for (i, algo) in algos.iter().enumerate() {
            let hash = sha256d(&(i as u64).to_le_bytes());
            chain.push(hash, version_for(*algo), 1000 + i as u32 * 60, 0x207f_ffff);
        }
        chain
    }

    #[test]
    fn test_heights_and_tip() {
        let chain = build_chain(&[Algo::Scrypt, Algo::Sha256d, Algo::Scrypt]);
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.tip().unwrap().algo(), Algo::Scrypt);
        assert_eq!(chain.entry(0).height, 0);
    }

    #[test]
    fn test_pprev_algo_walks_past_other_algos() {
        let chain = build_chain(&[
            Algo::Sha256d,
            Algo::Scrypt,
            Algo::Equihash,
            Algo::Scrypt,
            Algo::Equihash,
        ]);
        let tip = chain.tip_index().unwrap();
        // Nearest strict Equihash ancestor of the Equihash tip is index 2.
        assert_eq!(chain.pprev_algo(tip, Algo::Equihash), Some(2));
        assert_eq!(chain.pprev_algo(tip, Algo::Sha256d), Some(0));
        assert_eq!(chain.pprev_algo(0, Algo::Sha256d), None);
    }

    #[test]
    fn test_median_time_past() {
        let mut chain = ChainIndex::new();
        for (i, t) in [100u32, 200, 150, 300, 250].iter().enumerate() {
            chain.push(sha256d(&[i as u8]), BLOCK_VERSION_DEFAULT, *t, 0);
        }
        // Sorted times: 100 150 200 250 300 -> median 200.
        assert_eq!(chain.median_time_past(chain.tip_index().unwrap()), 200);
    }

    #[test]
    fn test_update_time_is_idempotent() {
        let chain = build_chain(&[Algo::Scrypt, Algo::Scrypt]);
        let prev = chain.tip_index().unwrap();
        let mut header = BlockHeader::default();
        chain.update_time(&mut header, prev, 5000);
        let first = header.time;
        chain.update_time(&mut header, prev, 5000);
        assert_eq!(header.time, first);
        assert_eq!(first, 5000);
    }

    #[test]
    fn test_update_time_respects_median_floor() {
        let chain = build_chain(&[Algo::Scrypt, Algo::Scrypt, Algo::Scrypt]);
        let prev = chain.tip_index().unwrap();
        let mut header = BlockHeader::default();
        // A wall clock far in the past is clamped up past the median.
        chain.update_time(&mut header, prev, 1);
        assert!(header.time as u64 > chain.median_time_past(prev));
    }

    #[test]
    fn test_supermajority_counts_window() {
        let mut chain = ChainIndex::new();
        for i in 0..10 {
            let version = if i < 5 { 2 } else { 4 };
            chain.push(sha256d(&[i as u8]), version, 1000 + i as u32, 0);
        }
        let tip = chain.tip_index().unwrap();
        assert!(chain.is_super_majority(4, tip, 5, 10));
        assert!(!chain.is_super_majority(4, tip, 6, 10));
        // Zero required is trivially satisfied.
        assert!(chain.is_super_majority(4, tip, 0, 10));
    }

    #[test]
    fn test_next_work_first_block_of_algo_uses_limit() {
        let params = ChainParams::regtest();
        let chain = build_chain(&[Algo::Scrypt, Algo::Scrypt]);
        let prev = chain.tip_index().unwrap();
        assert_eq!(
            chain.next_work_required(prev, &params, Algo::Equihash, 2000),
            params.pow_limit_bits
        );
    }

    #[test]
    fn test_next_work_single_prior_keeps_bits() {
        let mut params = ChainParams::regtest();
        params.allow_min_difficulty = false;
        let chain = build_chain(&[Algo::Sha256d, Algo::Scrypt]);
        let prev = chain.tip_index().unwrap();
        // Only one sha256d block exists: reuse its bits.
        assert_eq!(
            chain.next_work_required(prev, &params, Algo::Sha256d, 2000),
            chain.entry(0).bits
        );
    }

    #[test]
    fn test_min_difficulty_for_late_blocks() {
        let params = ChainParams::testnet();
        let chain = build_chain(&[Algo::Scrypt, Algo::Scrypt, Algo::Scrypt]);
        let prev = chain.tip_index().unwrap();
        let late = chain.entry(prev).time as u64 + 3 * params.algo_spacing();
        assert_eq!(
            chain.next_work_required(prev, &params, Algo::Scrypt, late),
            params.pow_limit_bits
        );
    }
}
