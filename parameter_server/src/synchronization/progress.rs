use std::collections::HashMap;

use comms::ThreadId;

/// Keeps the logical clock of every worker thread of one model on one shard.
///
/// The minimum over all the registered clocks is tracked incrementally, it never decreases until the
/// next `init`.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    progress: HashMap<ThreadId, u32>,
    min_clock: u32,
}

impl ProgressTracker {
    /// Creates a new `ProgressTracker` with no registered threads.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers exactly `tids` with a clock of `0`, forgetting every previous thread.
    ///
    /// # Arguments
    /// * `tids` - The worker threads taking part in the next round of training.
    pub fn init(&mut self, tids: &[ThreadId]) {
        self.progress.clear();
        self.progress.extend(tids.iter().map(|&tid| (tid, 0)));
        self.min_clock = 0;
    }

    /// Moves the clock of `tid` one step forward.
    ///
    /// # Arguments
    /// * `tid` - A registered thread.
    ///
    /// # Returns
    /// The new minimum clock if `tid` was the only thread holding the previous one, `None` otherwise
    /// or if `tid` isn't registered.
    pub fn advance_and_get_changed_min_clock(&mut self, tid: ThreadId) -> Option<u32> {
        let min_clock = self.min_clock;
        let clock = *self.progress.get(&tid)?;

        let unique_min = clock == min_clock
            && self
                .progress
                .iter()
                .all(|(&other, &c)| other == tid || c != min_clock);

        if let Some(clock) = self.progress.get_mut(&tid) {
            *clock += 1;
        }

        if unique_min {
            self.min_clock += 1;
            return Some(self.min_clock);
        }

        None
    }

    /// Returns the clock of `tid`, if registered.
    pub fn progress(&self, tid: ThreadId) -> Option<u32> {
        self.progress.get(&tid).copied()
    }

    pub fn min_clock(&self) -> u32 {
        self.min_clock
    }

    pub fn is_registered(&self, tid: ThreadId) -> bool {
        self.progress.contains_key(&tid)
    }

    pub fn num_threads(&self) -> usize {
        self.progress.len()
    }
}
