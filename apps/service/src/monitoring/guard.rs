use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::types::{ProbeKind, ProbeStatus};

/// Pass-scoped record of which probes have been launched.
///
/// Keeps a probe from starting twice for the same host and kind within one
/// pass. It holds no results and is emptied by the coordinator when the pass
/// ends.
#[derive(Debug, Default)]
pub struct DedupGuard {
    entries: DashMap<(String, ProbeKind), ProbeStatus>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `(host, kind)` as running.
    ///
    /// Returns `false` if the entry already existed, in which case the caller
    /// must not launch the probe.
    pub fn try_mark(&self, host: &str, kind: ProbeKind) -> bool {
        match self.entries.entry((host.to_string(), kind)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(ProbeStatus::Running);
                true
            }
        }
    }

    /// Claim every kind in `kinds` for one session of `host`.
    ///
    /// The first kind doubles as the host claim. A session that loses it is
    /// granted nothing, so concurrent sessions for the same host never split
    /// the probes between them.
    pub fn claim<const N: usize>(&self, host: &str, kinds: [ProbeKind; N]) -> [bool; N] {
        let mut claimed = [false; N];
        for (i, kind) in kinds.into_iter().enumerate() {
            if i > 0 && !claimed[0] {
                break;
            }
            claimed[i] = self.try_mark(host, kind);
        }
        claimed
    }

    #[cfg(test)]
    pub fn status(&self, host: &str, kind: ProbeKind) -> Option<ProbeStatus> {
        self.entries.get(&(host.to_string(), kind)).map(|entry| *entry.value())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Only called between passes.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
