//! C1: candidate control-channel frequency cache.
//!
//! A bounded FIFO of candidate frequencies with per-entry cooldowns, plus
//! best-effort persistence to a per-site text file. See spec.md §4.1 and
//! §6.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::ids::SiteId;

/// Maximum number of candidate frequencies retained.
pub const CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Entry {
    freq_hz: u64,
    cooldown_until: Option<Instant>,
}

/// Statistics counters for the cache (spec.md §3 "usage statistic").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub additions: u64,
    pub duplicates_rejected: u64,
    pub next_hits: u64,
    pub next_misses: u64,
}

/// The candidate cache itself.
#[derive(Debug, Clone)]
pub struct CandidateCache {
    entries: Vec<Entry>,
    read_index: usize,
    stats: CacheStats,
}

impl Default for CandidateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateCache {
    pub fn new() -> Self {
        Self { entries: Vec::with_capacity(CAPACITY), read_index: 0, stats: CacheStats::default() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Frequencies in FIFO order, for persistence or display.
    pub fn frequencies(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|e| e.freq_hz)
    }

    /// Add a frequency. Returns `true` on insertion, `false` if it was
    /// already present. When at capacity the oldest entry is evicted
    /// (FIFO); if the read index pointed past the evicted slot, it is
    /// decremented to keep pointing at the same logical entry.
    ///
    /// `bump_counter` mirrors the C API's `bump_counter` argument: when
    /// true, a successful insertion also increments the additions
    /// statistic. Call sites that are just reloading from disk can pass
    /// `false` to avoid inflating the stat with every process restart.
    pub fn add(&mut self, freq_hz: u64, bump_counter: bool) -> bool {
        if self.entries.iter().any(|e| e.freq_hz == freq_hz) {
            self.stats.duplicates_rejected += 1;
            return false;
        }

        if self.entries.len() >= CAPACITY {
            self.entries.remove(0);
            if self.read_index > 0 {
                self.read_index -= 1;
            }
        }

        self.entries.push(Entry { freq_hz, cooldown_until: None });
        if bump_counter {
            self.stats.additions += 1;
        }
        true
    }

    /// Rotate through entries starting at the read index, skipping the
    /// current control-channel frequency (if known) and anything still
    /// in cooldown. Advances the read index and records a hit/miss on
    /// success/failure.
    pub fn next(&mut self, now: Instant, current_cc_freq: Option<u64>) -> Option<u64> {
        if self.entries.is_empty() {
            self.stats.next_misses += 1;
            return None;
        }

        let n = self.entries.len();
        for step in 0..n {
            let i = (self.read_index + step) % n;
            let entry = self.entries[i];

            if Some(entry.freq_hz) == current_cc_freq {
                continue;
            }
            if entry.cooldown_until.is_some_and(|until| until > now) {
                continue;
            }

            self.read_index = (i + 1) % n;
            self.stats.next_hits += 1;
            return Some(entry.freq_hz);
        }

        self.stats.next_misses += 1;
        None
    }

    /// Set (or clear, with `None`) a cooldown on a specific frequency.
    pub fn set_cooldown(&mut self, freq_hz: u64, until: Option<Instant>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.freq_hz == freq_hz) {
            entry.cooldown_until = until;
        }
    }

    /// Candidate cache directory: `$HOME/.cache/dsd-neo` (or
    /// `%LOCALAPPDATA%\dsd-neo` on Windows-like hosts), falling back to
    /// `./dsdneo_cache`.
    pub fn default_cache_dir() -> PathBuf {
        if cfg!(windows) {
            if let Ok(local) = std::env::var("LOCALAPPDATA") {
                return PathBuf::from(local).join("dsd-neo");
            }
        } else if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".cache").join("dsd-neo");
        }
        PathBuf::from("./dsdneo_cache")
    }

    pub fn file_path(dir: &Path, site: &SiteId) -> PathBuf {
        dir.join(site.cache_file_name())
    }

    /// Write the cache to `<dir>/<site file name>`, best-effort via a
    /// temp file + rename. I/O failures are logged and otherwise
    /// ignored: the cache remains fully usable in memory (spec.md §5,
    /// §7 "cache I/O error").
    pub fn persist(&self, dir: &Path, site: &SiteId) {
        if let Err(e) = self.try_persist(dir, site) {
            log::warn!("candidate cache persist failed for {:?}: {e}", site.cache_file_name());
        }
    }

    fn try_persist(&self, dir: &Path, site: &SiteId) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let final_path = Self::file_path(dir, site);
        let tmp_path = final_path.with_extension("txt.tmp");

        {
            let mut f = std::fs::File::create(&tmp_path)?;
            for freq in self.frequencies() {
                writeln!(f, "{freq}")?;
            }
            f.flush()?;
        }

        std::fs::rename(&tmp_path, &final_path)
    }

    /// Load a cache file for `site` from `dir`, appending entries via
    /// `add()` in file order. Missing or unreadable files are non-fatal:
    /// an empty cache is returned. A malformed line aborts parsing the
    /// rest of the file without returning an error, per spec.md §5.
    pub fn load(dir: &Path, site: &SiteId) -> Self {
        let mut cache = Self::new();
        let path = Self::file_path(dir, site);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("no candidate cache at {path:?} ({e}), starting empty");
                return cache;
            }
        };

        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.parse::<u64>() {
                Ok(freq) => {
                    cache.add(freq, false);
                }
                Err(_) => {
                    log::warn!("malformed candidate cache line in {path:?}: {trimmed:?}, aborting load");
                    break;
                }
            }
        }

        cache
    }
}
