//! A single append-only segment file plus its in-memory key -> offset index.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{Result, StoreError};
use super::record;

pub const SEGMENT_PREFIX: &str = "current-data";

/// One append-only file and the index built over it.
///
/// A `Segment` is either the store's single active segment (the only one
/// anyone appends to) or sealed -- in which case its file and `index` never
/// change again until the compactor discards it along with its sealed peers.
pub struct Segment {
    id: u64,
    path: PathBuf,
    index: HashMap<String, u64>,
    /// Write offset, monotonic and equal to the file size.
    size: u64,
    writer: BufWriter<File>,
}

impl Segment {
    /// Returns the on-disk file name for segment `id` under `dir`.
    pub fn file_name(id: u64) -> String {
        format!("{SEGMENT_PREFIX}{id}")
    }

    /// Parses a segment id out of a file name, if it matches the naming
    /// convention `current-data<N>`.
    pub fn parse_id(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(SEGMENT_PREFIX)
            .and_then(|rest| rest.parse::<u64>().ok())
    }

    /// Creates a brand-new, empty segment file.
    pub fn create(dir: &Path, id: u64) -> Result<Self> {
        Self::create_with_name(dir, &Self::file_name(id), id)
    }

    /// Creates a brand-new, empty segment file under an arbitrary name. Used
    /// by the compactor to stage a merged segment under a working name that
    /// recovery won't recognize until it is renamed into place.
    pub fn create_with_name(dir: &Path, file_name: &str, id: u64) -> Result<Self> {
        let path = dir.join(file_name);
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .read(true)
            .open(&path)?;
        Ok(Self {
            id,
            path,
            index: HashMap::new(),
            size: 0,
            writer: BufWriter::new(file),
        })
    }

    /// Opens an existing segment file and rebuilds its index by scanning
    /// every record from offset 0, recording each record's start offset
    /// under its key and advancing by the record's total size. A mid-record
    /// truncation is `Corrupt`; a clean truncation exactly on a record
    /// boundary (as could follow a crash right after a flush) is tolerated.
    pub fn open_and_recover(path: PathBuf, id: u64) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut index = HashMap::new();
        let mut offset: u64 = 0;

        {
            let mut reader = BufReader::new(&file);
            loop {
                if reader.fill_buf_is_empty()? {
                    break;
                }
                match record::read_record(&mut reader) {
                    Ok((key, _value, total)) => {
                        index.insert(key, offset);
                        offset += total as u64;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        // `reader` may have buffered ahead of the logical end of the last
        // record; rewind the real file cursor to exactly `offset` before
        // treating it as append-ready.
        file.seek(SeekFrom::Start(offset))?;

        debug!(path = %path.display(), records = index.len(), "recovered segment");

        Ok(Self {
            id,
            path,
            size: offset,
            index,
            writer: BufWriter::new(file),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current write offset, equal to the file's size.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn index_has(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn index_get(&self, key: &str) -> Option<u64> {
        self.index.get(key).copied()
    }

    pub fn index_put(&mut self, key: String, offset: u64) {
        self.index.insert(key, offset);
    }

    pub fn index_keys(&self) -> impl Iterator<Item = &String> {
        self.index.keys()
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// Appends an encoded record for `(key, value)` and indexes it.
    /// Returns the offset the record was written at.
    pub fn append(&mut self, key: &str, value: &str) -> Result<u64> {
        let encoded = record::encode(key, value);
        let offset = self.size;
        let n = self.writer.write(&encoded)?;
        if n != encoded.len() {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "short write: wrote {n} of {} bytes",
                encoded.len()
            ))));
        }
        self.writer.flush()?;
        self.size += n as u64;
        self.index.insert(key.to_string(), offset);
        Ok(offset)
    }

    /// Reads the value stored at `offset` in this segment's file.
    pub fn read_at(&self, offset: u64) -> Result<String> {
        read_value_at(&self.path, offset)
    }

    /// Flushes buffered writes and fsyncs the underlying file.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Flushes and returns this segment's path, consuming it. Used only for
    /// the compactor's temporary merge-output segment, right before it is
    /// renamed into its committed name.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.path)
    }

    /// A read-only snapshot of this segment's path and index, cheap to hand
    /// to the background compaction thread without sharing the live file
    /// handle this segment may still be appending through.
    pub fn snapshot(&self) -> SealedSnapshot {
        SealedSnapshot {
            id: self.id,
            path: self.path.clone(),
            index: self.index.clone(),
        }
    }
}

/// Reads the value stored at `offset` in the segment file at `path`. Opens
/// the file fresh and closes it on every exit path via RAII, mirroring the
/// upstream `getFromSegment`, which is exactly what the single-writer design
/// needs: many concurrent Gets can each open their own handle onto a sealed
/// (immutable) file without touching the writer thread.
pub fn read_value_at(path: &Path, offset: u64) -> Result<String> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);
    record::read_value(&mut reader)
}

/// A snapshot of one sealed segment's path and index, used by the
/// compactor: it reads the live segment's state once, up front, then works
/// from its own copy without contending with the writer thread.
#[derive(Clone)]
pub struct SealedSnapshot {
    pub id: u64,
    pub path: PathBuf,
    pub index: HashMap<String, u64>,
}

/// Small helper trait so the recovery loop can distinguish "cleanly at EOF,
/// stop" from "mid-record truncation, fail" without consuming bytes it then
/// has to push back.
trait PeekEmpty {
    fn fill_buf_is_empty(&mut self) -> Result<bool>;
}

impl<R: std::io::BufRead> PeekEmpty for R {
    fn fill_buf_is_empty(&mut self) -> Result<bool> {
        Ok(self.fill_buf().map_err(StoreError::Io)?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let mut seg = Segment::create(dir.path(), 0).unwrap();
        let off_a = seg.append("a", "1").unwrap();
        let off_b = seg.append("b", "2").unwrap();
        assert_eq!(seg.read_at(off_a).unwrap(), "1");
        assert_eq!(seg.read_at(off_b).unwrap(), "2");
        assert_eq!(seg.size(), off_b + record::encoded_len("b", "2") as u64);
    }

    #[test]
    fn recovers_index_from_disk() {
        let dir = tempdir().unwrap();
        let path;
        {
            let mut seg = Segment::create(dir.path(), 7).unwrap();
            seg.append("x", "10").unwrap();
            seg.append("y", "20").unwrap();
            path = seg.path().to_path_buf();
        }
        let recovered = Segment::open_and_recover(path, 7).unwrap();
        assert_eq!(recovered.index_len(), 2);
        assert!(recovered.index_has("x"));
        let off = recovered.index_get("y").unwrap();
        assert_eq!(recovered.read_at(off).unwrap(), "20");
    }

    #[test]
    fn file_name_and_parse_id_round_trip() {
        let name = Segment::file_name(42);
        assert_eq!(name, "current-data42");
        assert_eq!(Segment::parse_id(&name), Some(42));
        assert_eq!(Segment::parse_id("not-a-segment"), None);
    }
}
