//! Duty-cycle policy.
//!
//! Maps a job's ordinal id to its fio pacing parameters by cycling through a
//! configured table. The table is read-only once the population is built.

use std::fmt;
use std::str::FromStr;

/// Default think time in microseconds when no duty cycles are configured.
pub const DEFAULT_THINK_TIME: u32 = 1;

/// Default number of blocks between think-time pauses.
pub const DEFAULT_THINK_TIME_BLOCKS: u32 = 1000;

/// One think-time / think-time-blocks pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    /// fio `--thinktime` in microseconds.
    pub think_time: u32,
    /// fio `--thinktime_blocks`.
    pub think_time_blocks: u32,
}

impl Default for DutyCycle {
    fn default() -> Self {
        Self {
            think_time: DEFAULT_THINK_TIME,
            think_time_blocks: DEFAULT_THINK_TIME_BLOCKS,
        }
    }
}

impl fmt::Display for DutyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.think_time, self.think_time_blocks)
    }
}

impl FromStr for DutyCycle {
    type Err = String;

    /// Parses `think_time:think_time_blocks`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (think_time, blocks) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("duty cycle '{s}' is not in think_time:blocks form"))?;

        let think_time = think_time
            .trim()
            .parse()
            .map_err(|e| format!("duty cycle '{s}' has invalid think time: {e}"))?;
        let think_time_blocks = blocks
            .trim()
            .parse()
            .map_err(|e| format!("duty cycle '{s}' has invalid block count: {e}"))?;

        Ok(Self {
            think_time,
            think_time_blocks,
        })
    }
}

/// Cyclic duty-cycle table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DutyCycleTable {
    cycles: Vec<DutyCycle>,
}

impl DutyCycleTable {
    pub fn new(cycles: Vec<DutyCycle>) -> Self {
        Self { cycles }
    }

    /// Parse a comma separated list of `think_time:blocks` pairs.
    ///
    /// An empty or blank string yields an empty table.
    pub fn parse(list: &str) -> Result<Self, String> {
        let cycles = list
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<DutyCycle>, _>>()?;
        Ok(Self { cycles })
    }

    /// Parameters for job `id`: `table[id mod len]`, or the default for an empty table.
    pub fn select(&self, id: usize) -> DutyCycle {
        if self.cycles.is_empty() {
            return DutyCycle::default();
        }
        self.cycles
            .get(id % self.cycles.len())
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}
