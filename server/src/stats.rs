//! Per-color write-count histogram, exposed to the TCP `STATS` verb as a sorted report.
//!
//! Uses the same sharded-map style as the client registry (`dashmap`), applied to a simple
//! counter rather than session state.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::store::Rgb;

pub struct Stats {
    counts: DashMap<(u8, u8, u8), u64, FxBuildHasher>,
}

impl Stats {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            counts: DashMap::with_hasher(FxBuildHasher),
        })
    }

    pub fn bump(&self, rgb: Rgb) {
        *self.counts.entry((rgb.r, rgb.g, rgb.b)).or_insert(0) += 1;
    }

    pub fn count_of(&self, rgb: Rgb) -> u64 {
        self.counts
            .get(&(rgb.r, rgb.g, rgb.b))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// Returns `"RRGGBB\tcount"` lines, sorted descending by count.
    pub fn report(&self) -> String {
        let mut rows: Vec<((u8, u8, u8), u64)> =
            self.counts.iter().map(|e| (*e.key(), *e.value())).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        rows.into_iter()
            .map(|((r, g, b), count)| {
                format!(
                    "{}\t{}",
                    Rgb { r, g, b }.to_hex(),
                    count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bumps_accumulate_per_color() {
        let stats = Stats::new();
        let red = Rgb { r: 255, g: 0, b: 0 };
        stats.bump(red);
        stats.bump(red);
        assert_eq!(stats.count_of(red), 2);
    }

    #[test]
    fn report_sorts_descending_by_count() {
        let stats = Stats::new();
        let red = Rgb { r: 255, g: 0, b: 0 };
        let blue = Rgb { r: 0, g: 0, b: 255 };
        stats.bump(blue);
        stats.bump(red);
        stats.bump(red);
        let report = stats.report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "ff0000\t2");
        assert_eq!(lines[1], "0000ff\t1");
    }
}
