//! The `Store`: aggregates segments, serializes writes and index mutations
//! through a single writer thread, and triggers background compaction.
//!
//! The upstream implementation this models drives its writer and indexer as
//! two cooperating goroutines exchanging messages over Go channels. The
//! cleanest Rust translation of "goroutine + channel" is "thread + mpsc
//! channel" -- and per the redesign note this store collapses the upstream's
//! two serializers (writer, indexer) into one, since nothing requires they
//! be separate tasks and the round-trip between them bought nothing.
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::compactor::{self, CompactionOutput};
use super::config::{FsyncPolicy, StoreConfig};
use super::error::{Result, StoreError};
use super::record;
use super::segment::{self, Segment};
use super::stats::StoreStats;

/// Segment count at or above which compaction is triggered (if none is
/// already running).
pub const COMPACTION_THRESHOLD: usize = 3;

enum Command {
    Put {
        key: String,
        value: String,
        reply: Sender<Result<()>>,
    },
    Get {
        key: String,
        reply: Sender<Option<(PathBuf, u64)>>,
    },
    Stats {
        reply: Sender<StoreStats>,
    },
    Keys {
        reply: Sender<Vec<String>>,
    },
    /// Force compaction regardless of the segment-count threshold. Used by
    /// the `compact` CLI command and by tests.
    Compact {
        reply: Sender<Result<()>>,
    },
    /// Sent by a background compaction thread back onto the writer's own
    /// queue once it finishes, successfully or not. The list swap happens
    /// here, inside the single task that owns the segment list, so it is
    /// indivisible with respect to concurrent Gets.
    CompactionDone {
        outcome: std::result::Result<CompactionOutput, String>,
    },
    Close {
        reply: Sender<()>,
    },
}

/// A crash-recoverable, append-only key/value store.
///
/// Cloning a `Store` handle is cheap (it is just a channel sender); every
/// clone talks to the same single writer thread, so `Put`s from different
/// handles are still totally ordered by arrival.
#[derive(Clone)]
pub struct Store {
    tx: Sender<Command>,
}

impl Store {
    /// Opens (or creates) a store at `dir`, recovering any existing segments
    /// before accepting new operations.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with_config(dir, StoreConfig::default())
    }

    /// Opens a store with an explicit [`StoreConfig`] (segment size cap,
    /// fsync policy).
    pub fn open_with_config<P: AsRef<Path>>(dir: P, config: StoreConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let mut existing: Vec<(u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(id) = Segment::parse_id(name) {
                    existing.push((id, path));
                }
            }
        }
        existing.sort_by_key(|(id, _)| *id);

        let mut segments = Vec::with_capacity(existing.len() + 1);
        for (id, path) in existing {
            segments.push(Segment::open_and_recover(path, id)?);
        }

        let next_id = segments.last().map(|s| s.id() + 1).unwrap_or(0);
        segments.push(Segment::create(&dir, next_id)?);

        info!(
            dir = %dir.display(),
            recovered_segments = segments.len() - 1,
            "opened store"
        );

        let (tx, rx) = mpsc::channel();
        let writer_tx = tx.clone();
        // The writer thread runs detached for the store's lifetime; dropping
        // the `JoinHandle` does not stop it. `close()` shuts it down cleanly
        // via the `Close` command instead of requiring callers to join it.
        let _: JoinHandle<()> = thread::spawn(move || {
            writer_loop(rx, dir, config, segments, next_id + 1, writer_tx);
        });

        Ok(Self { tx })
    }

    /// Appends `value` under `key`. Serialized with respect to every other
    /// Put and Get: the call returns only once the record is durable in the
    /// active segment's file and visible in its index.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Put {
                key: key.to_string(),
                value: value.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| StoreError::Closed)?;
        reply_rx.recv().map_err(|_| StoreError::Closed)?
    }

    /// Looks up `key` across segments newest-first and returns its value.
    pub fn get(&self, key: &str) -> Result<String> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Get {
                key: key.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| StoreError::Closed)?;
        let position = reply_rx.recv().map_err(|_| StoreError::Closed)?;
        match position {
            // The actual disk read happens here, outside the writer's
            // queue, so a slow read never blocks other Puts/Gets.
            Some((path, offset)) => segment::read_value_at(&path, offset),
            None => Err(StoreError::NotFound),
        }
    }

    /// Returns current store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Stats { reply: reply_tx })
            .map_err(|_| StoreError::Closed)?;
        reply_rx.recv().map_err(|_| StoreError::Closed)
    }

    /// Returns every live key across all segments, in no particular order.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Keys { reply: reply_tx })
            .map_err(|_| StoreError::Closed)?;
        reply_rx.recv().map_err(|_| StoreError::Closed)
    }

    /// Forces compaction to run now, regardless of the segment-count
    /// threshold, and waits for it to finish.
    pub fn compact(&self) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Compact { reply: reply_tx })
            .map_err(|_| StoreError::Closed)?;
        reply_rx.recv().map_err(|_| StoreError::Closed)?
    }

    /// Shuts the writer thread down cleanly, flushing and closing the
    /// active segment's file.
    pub fn close(&self) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Close { reply: reply_tx })
            .map_err(|_| StoreError::Closed)?;
        reply_rx.recv().map_err(|_| StoreError::Closed)
    }
}

fn writer_loop(
    rx: Receiver<Command>,
    dir: PathBuf,
    config: StoreConfig,
    mut segments: Vec<Segment>,
    mut next_id: u64,
    self_tx: Sender<Command>,
) {
    let mut compacting = false;
    let mut pending_compact_reply: Option<Sender<Result<()>>> = None;

    for cmd in rx.iter() {
        match cmd {
            Command::Put { key, value, reply } => {
                let result = handle_put(&dir, &config, &mut segments, &mut next_id, &key, &value);
                let should_compact = !compacting && segments.len() >= COMPACTION_THRESHOLD;
                let _ = reply.send(result);
                if should_compact {
                    compacting = true;
                    spawn_compaction(&dir, &segments, next_id, self_tx.clone());
                    next_id += 1;
                }
            }
            Command::Get { key, reply } => {
                let position = segments
                    .iter()
                    .rev()
                    .find_map(|s| s.index_get(&key).map(|off| (s.path().to_path_buf(), off)));
                let _ = reply.send(position);
            }
            Command::Stats { reply } => {
                let total_bytes = segments.iter().map(|s| s.size()).sum();
                let num_keys: HashSet<&String> =
                    segments.iter().flat_map(|s| s.index_keys()).collect();
                let stats = StoreStats {
                    num_keys: num_keys.len(),
                    num_segments: segments.len(),
                    total_bytes,
                    active_segment_id: segments.last().map(|s| s.id()).unwrap_or(0),
                };
                let _ = reply.send(stats);
            }
            Command::Keys { reply } => {
                let keys: HashSet<&String> = segments.iter().flat_map(|s| s.index_keys()).collect();
                let _ = reply.send(keys.into_iter().cloned().collect());
            }
            Command::Compact { reply } => {
                if compacting {
                    // A compaction (possibly auto-triggered by a prior Put)
                    // is already in flight; piggyback this caller on it
                    // instead of failing a request that would just need to
                    // be retried.
                    pending_compact_reply = Some(reply);
                } else if segments.len() < 2 {
                    // Nothing to merge with just the active segment.
                    let _ = reply.send(Ok(()));
                } else {
                    compacting = true;
                    pending_compact_reply = Some(reply);
                    spawn_compaction(&dir, &segments, next_id, self_tx.clone());
                    next_id += 1;
                }
            }
            Command::CompactionDone { outcome } => {
                compacting = false;
                let result = match outcome {
                    Ok(output) => {
                        publish_compaction(&mut segments, output);
                        Ok(())
                    }
                    Err(message) => {
                        warn!(error = %message, "compaction failed, keeping prior segment list");
                        Err(StoreError::CompactionFailed(message))
                    }
                };
                if let Some(reply) = pending_compact_reply.take() {
                    let _ = reply.send(result);
                }
            }
            Command::Close { reply } => {
                let _ = reply.send(());
                break;
            }
        }
    }
}

fn handle_put(
    dir: &Path,
    config: &StoreConfig,
    segments: &mut Vec<Segment>,
    next_id: &mut u64,
    key: &str,
    value: &str,
) -> Result<()> {
    let len = record::encoded_len(key, value) as u64;

    let needs_rollover = segments
        .last()
        .map(|active| active.size() + len > config.segment_size)
        .unwrap_or(true);
    if needs_rollover {
        let new_active = Segment::create(dir, *next_id)?;
        debug!(segment_id = *next_id, "sealed active segment, rolled over");
        *next_id += 1;
        segments.push(new_active);
    }

    let active = segments
        .last_mut()
        .expect("a store always has an active segment");
    active.append(key, value)?;
    if config.fsync == FsyncPolicy::Always {
        active.sync()?;
    }
    Ok(())
}

fn spawn_compaction(dir: &Path, segments: &[Segment], next_id: u64, self_tx: Sender<Command>) {
    // `active` is excluded from the merge; everything else is a sealed
    // snapshot the background thread can read independently.
    let sealed: Vec<_> = segments[..segments.len() - 1]
        .iter()
        .map(|s| s.snapshot())
        .collect();
    let dir = dir.to_path_buf();

    info!(sealed_segments = sealed.len(), "starting compaction");
    thread::spawn(move || {
        let outcome = compactor::compact(&dir, next_id, sealed).map_err(|e| e.to_string());
        let _ = self_tx.send(Command::CompactionDone { outcome });
    });
}

/// Replaces exactly the sealed segments that were part of this compaction's
/// snapshot with the merged segment, leaving everything else untouched.
///
/// `segments` may have grown since the snapshot was taken -- rollovers can
/// seal new segments while a compaction runs in the background. Naively
/// collapsing to `[merged, active]` would silently drop those segments (and
/// every key only they index). Instead the merged segment is inserted where
/// its inputs used to sit, so newest-wins lookup order is preserved.
fn publish_compaction(segments: &mut Vec<Segment>, output: CompactionOutput) {
    info!(
        merged_segment_id = output.segment.id(),
        keys = output.segment.index_len(),
        superseded = output.superseded_paths.len(),
        "compaction finished"
    );

    let superseded: HashSet<PathBuf> = output.superseded_paths.iter().cloned().collect();
    let insert_at = segments
        .iter()
        .position(|s| superseded.contains(s.path()))
        .unwrap_or(0);

    segments.retain(|s| !superseded.contains(s.path()));
    segments.insert(insert_at.min(segments.len()), output.segment);

    for old_path in &output.superseded_paths {
        if let Err(e) = fs::remove_file(old_path) {
            warn!(path = %old_path.display(), error = %e, "failed to remove superseded segment");
        }
    }
}
