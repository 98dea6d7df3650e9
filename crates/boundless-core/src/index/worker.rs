//! Off-thread index rebuilds tagged with a generation counter.
//!
//! The worker only ever sees a copied `(id, bbox)` snapshot; live strokes
//! are never shared with it.

use super::{stroke_footprint, IndexLimits, TileKey, TileSpan};
use crate::stroke::StrokeId;
use kurbo::Rect;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

/// Snapshot handed to a rebuild.
#[derive(Debug, Clone)]
pub struct RebuildRequest {
    pub cell: f64,
    pub limits: IndexLimits,
    pub strokes: Vec<(StrokeId, Rect)>,
    pub generation: u64,
}

/// A complete tiling, ready to install with [`super::GridIndex::apply_rebuild`].
#[derive(Debug, Clone)]
pub struct RebuildResult {
    pub cell: f64,
    pub tiles: HashMap<TileKey, Vec<StrokeId>>,
    pub all: HashSet<StrokeId>,
    pub(crate) footprints: HashMap<StrokeId, TileSpan>,
    pub overflowed: HashSet<StrokeId>,
    pub generation: u64,
    /// Number of strokes in the snapshot.
    pub count: usize,
}

impl RebuildResult {
    pub fn is_overflow(&self) -> bool {
        !self.overflowed.is_empty()
    }
}

/// Compute the tiling for a snapshot. Same rules as [`super::GridIndex::insert`].
pub fn compute_rebuild(request: RebuildRequest) -> RebuildResult {
    let RebuildRequest {
        cell,
        limits,
        strokes,
        generation,
    } = request;
    let mut tiles: HashMap<TileKey, Vec<StrokeId>> = HashMap::new();
    let mut all = HashSet::with_capacity(strokes.len());
    let mut footprints = HashMap::with_capacity(strokes.len());
    let mut overflowed = HashSet::new();
    for (id, bbox) in &strokes {
        all.insert(*id);
        match stroke_footprint(*bbox, cell, &limits) {
            Some(span) => {
                for key in span.keys() {
                    tiles.entry(key).or_default().push(*id);
                }
                footprints.insert(*id, span);
            }
            None => {
                overflowed.insert(*id);
            }
        }
    }
    RebuildResult {
        cell,
        tiles,
        all,
        footprints,
        overflowed,
        generation,
        count: strokes.len(),
    }
}

/// Outcome of polling the rebuilder.
#[derive(Debug)]
pub enum RebuildPoll {
    /// Nothing requested.
    Idle,
    /// Still waiting on the latest generation.
    Pending,
    /// The latest generation arrived and matches the live stroke count.
    Ready(RebuildResult),
    /// The latest result no longer matches the document; request again.
    Stale,
}

/// Runs index rebuilds on a background thread, or inline when threading is off.
pub struct IndexRebuilder {
    threaded: bool,
    /// Channel to send requests to the worker thread.
    request_tx: Option<Sender<RebuildRequest>>,
    /// Channel to receive results from the worker thread.
    result_rx: Option<Receiver<RebuildResult>>,
    /// Handle to the worker thread.
    _thread: Option<JoinHandle<()>>,
    /// Result computed inline, delivered on the next poll.
    inline: Option<RebuildResult>,
    latest: u64,
    pending: bool,
}

impl IndexRebuilder {
    /// Create a rebuilder. The worker thread is spawned on first use.
    pub fn new(threaded: bool) -> Self {
        Self {
            threaded,
            request_tx: None,
            result_rx: None,
            _thread: None,
            inline: None,
            latest: 0,
            pending: false,
        }
    }

    /// Whether a requested rebuild has not been delivered yet.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Latest requested generation.
    pub fn generation(&self) -> u64 {
        self.latest
    }

    /// Request a rebuild of the given snapshot. Supersedes any in-flight request.
    pub fn request(&mut self, cell: f64, limits: IndexLimits, strokes: Vec<(StrokeId, Rect)>) -> u64 {
        self.latest += 1;
        self.pending = true;
        let generation = self.latest;
        let request = RebuildRequest {
            cell,
            limits,
            strokes,
            generation,
        };
        if !self.threaded {
            self.inline = Some(compute_rebuild(request));
            return generation;
        }
        let request = match self.sender() {
            Some(tx) => match tx.send(request) {
                Ok(()) => return generation,
                Err(err) => err.0,
            },
            None => request,
        };
        log::warn!("index worker unavailable; rebuilding inline");
        self.shutdown();
        self.inline = Some(compute_rebuild(request));
        generation
    }

    /// Poll for a finished rebuild (non-blocking).
    ///
    /// Results behind the latest generation are dropped; the latest one is
    /// rejected as [`RebuildPoll::Stale`] when `live_count` no longer matches.
    pub fn poll(&mut self, live_count: usize) -> RebuildPoll {
        if !self.pending {
            return RebuildPoll::Idle;
        }
        let mut newest = self.inline.take();
        if let Some(rx) = &self.result_rx {
            loop {
                match rx.try_recv() {
                    Ok(result) => newest = Some(result),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        log::warn!("index worker exited; pending rebuild lost");
                        self.pending = false;
                        self.shutdown();
                        return RebuildPoll::Stale;
                    }
                }
            }
        }
        let Some(result) = newest else {
            return RebuildPoll::Pending;
        };
        if result.generation < self.latest {
            log::debug!(
                "dropping stale index rebuild gen {} (latest {})",
                result.generation,
                self.latest
            );
            return RebuildPoll::Pending;
        }
        self.pending = false;
        if result.count != live_count {
            log::debug!(
                "dropping index rebuild gen {}: {} strokes, document has {}",
                result.generation,
                result.count,
                live_count
            );
            return RebuildPoll::Stale;
        }
        RebuildPoll::Ready(result)
    }

    fn sender(&mut self) -> Option<&Sender<RebuildRequest>> {
        if self.request_tx.is_none() {
            let (request_tx, request_rx) = channel::<RebuildRequest>();
            let (result_tx, result_rx) = channel::<RebuildResult>();
            let spawned = thread::Builder::new()
                .name("index-rebuild".into())
                .spawn(move || worker_loop(request_rx, result_tx));
            match spawned {
                Ok(handle) => {
                    self.request_tx = Some(request_tx);
                    self.result_rx = Some(result_rx);
                    self._thread = Some(handle);
                }
                Err(err) => {
                    log::warn!("failed to spawn index worker: {err}");
                    return None;
                }
            }
        }
        self.request_tx.as_ref()
    }

    fn shutdown(&mut self) {
        self.request_tx = None;
        self.result_rx = None;
        self._thread = None;
    }
}

impl Default for IndexRebuilder {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Drop for IndexRebuilder {
    fn drop(&mut self) {
        // Dropping the sender ends the worker loop
        self.shutdown();
    }
}

impl std::fmt::Debug for IndexRebuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRebuilder")
            .field("threaded", &self.threaded)
            .field("latest", &self.latest)
            .field("pending", &self.pending)
            .finish()
    }
}

fn worker_loop(requests: Receiver<RebuildRequest>, results: Sender<RebuildResult>) {
    while let Ok(mut request) = requests.recv() {
        // Only the newest queued request matters
        while let Ok(newer) = requests.try_recv() {
            request = newer;
        }
        if results.send(compute_rebuild(request)).is_err() {
            break;
        }
    }
    log::debug!("index worker exiting");
}
