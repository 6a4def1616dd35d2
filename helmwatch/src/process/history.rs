use super::*;

use std::collections::VecDeque;
use std::time::Instant;

/// One observation of the elected master (or its absence) at a membership
/// transition.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub at: Instant,
    pub master: Option<Node>,
}

/// Append-only, time-bounded log of the observed master identity.
///
/// Entries older than the retention window are evicted lazily. Queries take
/// `now` explicitly and answer "as of now"; an answer already returned never
/// changes retroactively.
#[derive(Clone, Debug)]
pub struct MasterHistory {
    retention: Duration,
    entries: VecDeque<HistoryEntry>,
}

impl MasterHistory {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            entries: VecDeque::new(),
        }
    }

    /// Rebuild a frozen history from wire entries in chronological order.
    pub fn from_wire(
        retention: Duration,
        now: Instant,
        entries: impl IntoIterator<Item = (Duration, Option<Node>)>,
    ) -> Self {
        let mut history = Self::new(retention);
        for (age, master) in entries {
            let at = now.checked_sub(age).unwrap_or(now);
            history.entries.push_back(HistoryEntry { at, master });
        }
        history
    }

    pub fn record(&mut self, now: Instant, master: Option<Node>) {
        self.entries.push_back(HistoryEntry { at: now, master });
        // The newest entry survives any window so the current master stays known.
        while self.entries.len() > 1 {
            let front = self.entries.front().unwrap();
            if now.duration_since(front.at) > self.retention {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn in_window(&self, now: Instant) -> impl Iterator<Item = &HistoryEntry> {
        let retention = self.retention;
        self.entries
            .iter()
            .filter(move |e| now.duration_since(e.at) <= retention)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Master in the newest observation, if any.
    pub fn current_master(&self) -> Option<&Node> {
        self.entries.back().and_then(|e| e.master.as_ref())
    }

    /// Most recent non-null master within the window.
    pub fn most_recent_master(&self, now: Instant) -> Option<&Node> {
        let retention = self.retention;
        self.entries
            .iter()
            .rev()
            .filter(move |e| now.duration_since(e.at) <= retention)
            .find_map(|e| e.master.as_ref())
    }

    /// True if any master was observed within the last `lookback`.
    pub fn seen_master_within(&self, now: Instant, lookback: Duration) -> bool {
        self.entries
            .iter()
            .rev()
            .take_while(|e| now.duration_since(e.at) <= lookback)
            .any(|e| e.master.is_some())
    }

    /// Number of times the master changed between distinct identities within
    /// the window. Null observations are skipped, not counted.
    pub fn identity_change_count(&self, now: Instant) -> usize {
        let mut count = 0;
        let mut prev: Option<&NodeId> = None;
        for e in self.in_window(now) {
            if let Some(m) = &e.master {
                if prev.is_some_and(|p| p != &m.id) {
                    count += 1;
                }
                prev = Some(&m.id);
            }
        }
        count
    }

    /// Number of times an elected master went away without an immediate
    /// successor (a non-null to null transition) within the window.
    pub fn null_transition_count(&self, now: Instant) -> usize {
        let mut count = 0;
        let mut prev_elected = false;
        for e in self.in_window(now) {
            match &e.master {
                Some(_) => prev_elected = true,
                None => {
                    if prev_elected {
                        count += 1;
                    }
                    prev_elected = false;
                }
            }
        }
        count
    }

    /// Non-null masters within the window, oldest first, consecutive
    /// repetitions collapsed.
    pub fn recent_masters(&self, now: Instant) -> Vec<Node> {
        let mut out: Vec<Node> = vec![];
        for e in self.in_window(now) {
            if let Some(m) = &e.master {
                if out.last().map(|l| &l.id) != Some(&m.id) {
                    out.push(m.clone());
                }
            }
        }
        out
    }

    /// Raw entries within the window as (age, master) pairs, oldest first.
    pub fn wire_entries(&self, now: Instant) -> Vec<(Duration, Option<Node>)> {
        self.in_window(now)
            .map(|e| (now.duration_since(e.at), e.master.clone()))
            .collect()
    }
}
