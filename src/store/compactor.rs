//! Background compaction: merges every sealed segment into one, keeping
//! only the newest value per key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::Result;
use super::segment::{self, SealedSnapshot, Segment};

/// The merged segment plus the sealed segments it supersedes, ready for the
/// writer thread to publish.
pub struct CompactionOutput {
    pub segment: Segment,
    pub superseded_paths: Vec<PathBuf>,
}

/// Merges `sealed` (oldest to newest, excluding the active segment) into one
/// new segment under `dir`, named with `new_id`.
///
/// Rather than the upstream's per-key "is this shadowed by a later segment"
/// scan, this folds the sealed snapshots oldest-to-newest into a single
/// `key -> (segment, offset)` map, letting a later segment's entry overwrite
/// an earlier one. The result is identical -- only the newest occurrence of
/// each key survives -- without threading an O(segments) check through every
/// key of every segment.
pub fn compact(dir: &Path, new_id: u64, sealed: Vec<SealedSnapshot>) -> Result<CompactionOutput> {
    let mut surviving: HashMap<String, (PathBuf, u64)> = HashMap::new();
    for snapshot in &sealed {
        for (key, offset) in &snapshot.index {
            surviving.insert(key.clone(), (snapshot.path.clone(), *offset));
        }
    }

    let working_name = format!(".compacting-{new_id}");
    let mut staged = Segment::create_with_name(dir, &working_name, new_id)?;
    for (key, (path, offset)) in &surviving {
        let value = segment::read_value_at(path, *offset)?;
        staged.append(key, &value)?;
    }

    let working_path = staged.finish()?;
    let final_path = dir.join(Segment::file_name(new_id));
    fs::rename(&working_path, &final_path)?;
    let merged = Segment::open_and_recover(final_path, new_id)?;

    Ok(CompactionOutput {
        segment: merged,
        superseded_paths: sealed.into_iter().map(|s| s.path).collect(),
    })
}
