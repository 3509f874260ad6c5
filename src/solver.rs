//! Tier-by-tier retrograde solving.
//!
//! Tiers are solved from the most advanced (closest to the end of the game)
//! down to tier 0. Every child of a position lives in a later tier, so its
//! record is already in the store when the parent is reached.
//!
//! [`TierSolver`] runs on one thread. [`ParallelSolver`] splits tiers into
//! chunks of ranks and solves them on a rayon pool, letting a small window of
//! tiers run at once. A position whose child is not durable yet is left
//! for the next sweep instead of blocking.

use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::cache::{Lookup, SharedState, SolveCache, WorkerCache};
use crate::child::{ChildHasher, Move};
use crate::cursor::TierCursor;
use crate::error::{Error, Result};
use crate::game::TierGame;
use crate::record::{Combiner, Record, Value};
use crate::store::RecordStore;
use crate::tier::{Symbol, TierIndex};

/// Options for both solvers.
#[derive(Clone, Debug)]
pub struct SolverOptions {
    // None means use num_cpus.
    num_threads: Option<usize>,
    flush_threshold: usize,
    chunk_size: u64,
    memo_capacity: usize,
    tier_window: usize,
    verify_tiers: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            flush_threshold: 1 << 16,
            chunk_size: 4096,
            memo_capacity: 1 << 14,
            tier_window: 2,
            verify_tiers: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl SolverOptions {
    /// Defaults overlaid with `TIERSOLVE_THREADS` (fallback
    /// `RAYON_NUM_THREADS`), `TIERSOLVE_FLUSH` and `TIERSOLVE_CHUNK`.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.num_threads = env_parse("TIERSOLVE_THREADS").or_else(|| env_parse("RAYON_NUM_THREADS"));
        if let Some(flush) = env_parse("TIERSOLVE_FLUSH") {
            options.flush_threshold = flush;
        }
        if let Some(chunk) = env_parse("TIERSOLVE_CHUNK") {
            options.chunk_size = chunk;
        }
        options
    }

    /// How many threads the parallel solver runs. Defaults to num_cpus.
    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Buffered records before a write buffer is flushed.
    pub fn with_flush_threshold(mut self, records: usize) -> Self {
        self.flush_threshold = records;
        self
    }

    /// Ranks per parallel work unit.
    pub fn with_chunk_size(mut self, ranks: u64) -> Self {
        self.chunk_size = ranks;
        self
    }

    /// Child records each worker keeps in memory.
    pub fn with_memo_capacity(mut self, entries: usize) -> Self {
        self.memo_capacity = entries;
        self
    }

    /// Tiers the parallel solver works on at once.
    pub fn with_tier_window(mut self, tiers: usize) -> Self {
        self.tier_window = tiers;
        self
    }

    /// Skip checking that every move reaches a later tier.
    pub fn unchecked(mut self) -> Self {
        self.verify_tiers = false;
        self
    }

    pub fn threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Totals of a finished solve.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SolveSummary {
    pub positions: u64,
    pub primitives: u64,
    pub tiers: usize,
    /// Parallel sweeps; 0 for the sequential solver.
    pub sweeps: usize,
    pub elapsed: Duration,
}

fn violation(tier: usize, address: u64, slot: Option<usize>, reason: impl Into<String>) -> Error {
    Error::AdapterViolation {
        tier,
        address,
        slot,
        reason: reason.into(),
    }
}

/// Record of one position, or `None` when some child is still pending.
#[allow(clippy::too_many_arguments)]
fn evaluate<G, F>(
    game: &G,
    hasher: &mut ChildHasher<'_>,
    board: &[Symbol],
    tier: usize,
    address: u64,
    verify: bool,
    moves: &mut Vec<Move>,
    mut read: F,
) -> Result<Option<Record>>
where
    G: TierGame + ?Sized,
    F: FnMut(u64, usize) -> Result<Lookup>,
{
    let value = game.primitive_value(board);
    if value != Value::Undecided {
        return Ok(Some(Record::primitive(value)));
    }
    moves.clear();
    game.generate_moves(board, moves);
    if moves.is_empty() {
        return Err(violation(tier, address, None, "no moves from a non-primitive position"));
    }
    hasher.advance(board)?;
    let mut combiner = Combiner::default();
    for &mv in moves.iter() {
        let child = hasher.child(mv)?;
        if verify && child.tier <= tier {
            return Err(violation(
                tier,
                address,
                Some(mv.slot),
                format!("move leads to tier {}, which is not later", child.tier),
            ));
        }
        log::trace!("{address} -> {} (tier {})", child.address, child.tier);
        match read(child.address, child.tier)? {
            Lookup::Found(record) => combiner.push(record),
            Lookup::Pending => return Ok(None),
        }
    }
    combiner.finish().map(Some).map_err(|value| {
        violation(tier, address, None, format!("child value {value:?} cannot be combined"))
    })
}

fn check_store(index: &TierIndex, store: &dyn RecordStore) -> Result<()> {
    if store.len() != index.total() {
        return Err(Error::CorruptStore {
            reason: format!(
                "store holds {} records, game needs {}",
                store.len(),
                index.total()
            ),
        });
    }
    Ok(())
}

/// Single-threaded solver.
pub struct TierSolver<'g, G: TierGame + ?Sized> {
    game: &'g G,
    index: TierIndex,
    options: SolverOptions,
}

impl<'g, G: TierGame + ?Sized> TierSolver<'g, G> {
    pub fn new(game: &'g G, options: SolverOptions) -> Result<Self> {
        Ok(Self {
            game,
            index: TierIndex::for_game(game)?,
            options,
        })
    }

    pub fn index(&self) -> &TierIndex {
        &self.index
    }

    /// Solves every position into `store`, which must hold exactly
    /// [`TierIndex::total`] records.
    pub fn solve(&self, store: &dyn RecordStore) -> Result<SolveSummary> {
        check_store(&self.index, store)?;
        let start = Instant::now();
        let mut cache = SolveCache::new(store, self.game.record_format(), self.options.flush_threshold);
        let mut hasher = ChildHasher::new(&self.index, &self.game.replacements())?;
        let mut moves = Vec::new();
        let mut summary = SolveSummary {
            tiers: self.index.num_tiers(),
            ..Default::default()
        };
        log::info!(
            "solving {} positions in {} tiers",
            self.index.total(),
            self.index.num_tiers()
        );

        for tier in (0..self.index.num_tiers()).rev() {
            let tier_start = Instant::now();
            let size = self.index.tier_size(tier)?;
            if size == 0 {
                continue;
            }
            let mut cursor = TierCursor::new(&self.index, tier)?;
            loop {
                let address = cursor.address();
                let record = evaluate(
                    self.game,
                    &mut hasher,
                    cursor.board(),
                    tier,
                    address,
                    self.options.verify_tiers,
                    &mut moves,
                    |child, child_tier| match cache.get(child)? {
                        Lookup::Pending => Err(Error::MissingRecord {
                            address: child,
                            tier: child_tier,
                        }),
                        found => Ok(found),
                    },
                )?
                .ok_or(Error::MissingRecord { address, tier })?;
                if record.remoteness == 0 {
                    summary.primitives += 1;
                }
                cache.put(address, record)?;
                if cursor.next().is_none() {
                    break;
                }
            }
            cache.flush()?;
            summary.positions += size;
            log::info!(
                "tier {tier}: {size} positions in {:.2?}",
                tier_start.elapsed()
            );
        }
        store.sync()?;
        summary.elapsed = start.elapsed();
        log::info!(
            "solved {} positions ({} primitive) in {:.2?}",
            summary.positions,
            summary.primitives,
            summary.elapsed
        );
        Ok(summary)
    }
}

/// Ranks of one tier still to be solved.
#[derive(Clone, Debug)]
struct WorkUnit {
    tier: usize,
    ranks: Ranks,
}

#[derive(Clone, Debug)]
enum Ranks {
    /// A contiguous run `start..end`, walked with a cursor.
    Span(u64, u64),
    /// Scattered ranks left pending by an earlier sweep.
    Retry(Vec<u64>),
}

#[derive(Debug, Default)]
struct UnitOutcome {
    resolved: u64,
    primitives: u64,
    leftover: Option<WorkUnit>,
}

/// Per-thread state carried across work units.
struct Worker<'a, 's> {
    cache: WorkerCache<'a, 's>,
    hasher: ChildHasher<'a>,
    moves: Vec<Move>,
    board: Vec<Symbol>,
}

/// Multi-threaded solver over a shared store.
pub struct ParallelSolver<'g, G: TierGame + ?Sized> {
    game: &'g G,
    index: TierIndex,
    options: SolverOptions,
}

impl<'g, G: TierGame + ?Sized> ParallelSolver<'g, G> {
    pub fn new(game: &'g G, options: SolverOptions) -> Result<Self> {
        Ok(Self {
            game,
            index: TierIndex::for_game(game)?,
            options,
        })
    }

    pub fn index(&self) -> &TierIndex {
        &self.index
    }

    /// Solves every position into `store`, which must hold exactly
    /// [`TierIndex::total`] records.
    pub fn solve(&self, store: &dyn RecordStore) -> Result<SolveSummary> {
        self.solve_inspect(store, |_| {})
    }

    /// Like [`ParallelSolver::solve`], handing the shared state to `inspect`
    /// once all workers are done.
    pub fn solve_inspect<F>(&self, store: &dyn RecordStore, inspect: F) -> Result<SolveSummary>
    where
        F: FnOnce(&SharedState<'_>),
    {
        check_store(&self.index, store)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads())
            .build()?;
        let shared = SharedState::new(store, self.game.record_format());
        let summary = pool.install(|| self.run(&shared))?;
        store.sync()?;
        inspect(&shared);
        Ok(summary)
    }

    fn run(&self, shared: &SharedState<'_>) -> Result<SolveSummary> {
        let start = Instant::now();
        let hasher = ChildHasher::new(&self.index, &self.game.replacements())?;
        let chunk = self.options.chunk_size.max(1);
        let window = self.options.tier_window.max(1);
        let mut summary = SolveSummary {
            tiers: self.index.num_tiers(),
            ..Default::default()
        };
        log::info!(
            "solving {} positions in {} tiers on {} threads",
            self.index.total(),
            self.index.num_tiers(),
            self.options.threads()
        );

        let mut next_tier = self.index.num_tiers();
        let mut active: Vec<WorkUnit> = Vec::new();
        let mut active_tiers: Vec<usize> = Vec::new();
        loop {
            // Admit tiers in solve order until the window is full.
            while active_tiers.len() < window && next_tier > 0 {
                next_tier -= 1;
                let size = self.index.tier_size(next_tier)?;
                if size == 0 {
                    continue;
                }
                active_tiers.push(next_tier);
                let mut begin = 0;
                while begin < size {
                    let end = (begin + chunk).min(size);
                    active.push(WorkUnit {
                        tier: next_tier,
                        ranks: Ranks::Span(begin, end),
                    });
                    begin = end;
                }
            }
            if active.is_empty() {
                break;
            }

            summary.sweeps += 1;
            let units = std::mem::take(&mut active);
            log::debug!(
                "sweep {}: {} units over tiers {:?}",
                summary.sweeps,
                units.len(),
                active_tiers
            );
            let outcomes: Vec<UnitOutcome> = units
                .into_par_iter()
                .map_init(
                    || Worker {
                        cache: WorkerCache::new(
                            shared,
                            self.options.flush_threshold,
                            self.options.memo_capacity,
                        ),
                        hasher: hasher.clone(),
                        moves: Vec::new(),
                        board: Vec::with_capacity(self.index.slots()),
                    },
                    |worker, unit| self.solve_unit(worker, unit),
                )
                .collect::<Result<_>>()?;

            let mut resolved = 0;
            for outcome in outcomes {
                resolved += outcome.resolved;
                summary.primitives += outcome.primitives;
                active.extend(outcome.leftover);
            }
            summary.positions += resolved;

            let before = active_tiers.len();
            active_tiers.retain(|&tier| active.iter().any(|unit| unit.tier == tier));
            if before != active_tiers.len() {
                log::info!(
                    "{} of {} positions solved after sweep {}",
                    summary.positions,
                    self.index.total(),
                    summary.sweeps
                );
            } else if resolved == 0 {
                // The most advanced active tier only reads finished tiers,
                // so a sweep without progress means a move stays in its tier.
                let tier = active_tiers.first().copied().unwrap_or_default();
                let address = self.index.tier_offset(tier)?;
                return Err(violation(tier, address, None, "sweep made no progress"));
            }
        }

        summary.elapsed = start.elapsed();
        log::info!(
            "solved {} positions ({} primitive) in {} sweeps, {:.2?}",
            summary.positions,
            summary.primitives,
            summary.sweeps,
            summary.elapsed
        );
        Ok(summary)
    }

    fn solve_unit(&self, worker: &mut Worker<'_, '_>, unit: WorkUnit) -> Result<UnitOutcome> {
        let WorkUnit { tier, ranks } = unit;
        let mut outcome = UnitOutcome::default();
        let mut pending = Vec::new();
        match ranks {
            Ranks::Span(begin, end) => {
                let mut cursor = TierCursor::at(&self.index, tier, begin)?;
                loop {
                    let rank = cursor.rank();
                    if !self.solve_one(worker, tier, cursor.address(), cursor.board(), &mut outcome)? {
                        pending.push(rank);
                    }
                    if rank + 1 >= end || cursor.next().is_none() {
                        break;
                    }
                }
            }
            Ranks::Retry(ranks) => {
                let mut board = std::mem::take(&mut worker.board);
                for rank in ranks {
                    let address = self.index.address_for_tier_and_rank(tier, rank)?;
                    self.index.unhash_into(address, &mut board)?;
                    if !self.solve_one(worker, tier, address, &board, &mut outcome)? {
                        pending.push(rank);
                    }
                }
                worker.board = board;
            }
        }
        // Workers are dropped by rayon without notice, so nothing may stay
        // buffered past the end of a unit.
        worker.cache.flush()?;
        if !pending.is_empty() {
            outcome.leftover = Some(WorkUnit {
                tier,
                ranks: Ranks::Retry(pending),
            });
        }
        Ok(outcome)
    }

    /// Returns false when the position has to wait for a later sweep.
    fn solve_one(
        &self,
        worker: &mut Worker<'_, '_>,
        tier: usize,
        address: u64,
        board: &[Symbol],
        outcome: &mut UnitOutcome,
    ) -> Result<bool> {
        let shared = worker.cache.shared();
        if !shared.claim(address) {
            return Ok(false);
        }
        let cache = &mut worker.cache;
        let result = evaluate(
            self.game,
            &mut worker.hasher,
            board,
            tier,
            address,
            self.options.verify_tiers,
            &mut worker.moves,
            |child, _| cache.get(child),
        );
        match result {
            Ok(Some(record)) => {
                if record.remoteness == 0 {
                    outcome.primitives += 1;
                }
                outcome.resolved += 1;
                cache.put(address, record)?;
                Ok(true)
            }
            Ok(None) => {
                shared.release(address);
                Ok(false)
            }
            Err(e) => {
                shared.release(address);
                Err(e)
            }
        }
    }
}
