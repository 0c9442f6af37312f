//! Store statistics, for the `stats` CLI command and tests.

use std::fmt;

/// Point-in-time statistics about a [`super::Store`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub num_keys: usize,
    pub num_segments: usize,
    pub total_bytes: u64,
    pub active_segment_id: u64,
}

impl StoreStats {
    pub fn total_kb(&self) -> f64 {
        self.total_bytes as f64 / 1024.0
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Store statistics:")?;
        writeln!(f, "  keys: {}", self.num_keys)?;
        writeln!(f, "  segments: {}", self.num_segments)?;
        writeln!(f, "  total size: {:.2} KB", self.total_kb())?;
        write!(f, "  active segment: {}", self.active_segment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_readable_summary() {
        let stats = StoreStats {
            num_keys: 3,
            num_segments: 2,
            total_bytes: 2048,
            active_segment_id: 1,
        };
        let rendered = format!("{stats}");
        assert!(rendered.contains("keys: 3"));
        assert!(rendered.contains("2.00 KB"));
    }
}
