//! Interrupt edge detection and event management.
//!
//! Each DMA leg turns its level-held `done` status into a one-tick pulse with
//! an [`EdgeDetector`]. The pulses feed pulse-type [`EventSource`]s in an
//! [`EventManager`], which latches them as pending until the host clears
//! them and combines enabled pending events into one interrupt line.

/// Rising-edge detector on a level signal.
///
/// The shadow holds the level sampled at the previous edge; the pulse is
/// high while the live level is 1 and the shadow is 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDetector {
    shadow: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pulse for this tick given the live level.
    #[inline]
    pub fn pulse(&self, live: bool) -> bool {
        live && !self.shadow
    }

    /// Sample the live level at the clock edge.
    #[inline]
    pub fn commit(&mut self, live: bool) {
        self.shadow = live;
    }
}

/// One pulse-triggered interrupt source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub name: String,
    pub description: String,
    pub pending: bool,
    pub enabled: bool,
}

/// Pending/enable bookkeeping for a set of event sources.
///
/// Bit `i` of every mask refers to the `i`-th source added.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    sources: Vec<EventSource>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source; returns its bit index.
    pub fn add_source(&mut self, name: &str, description: &str) -> usize {
        self.sources.push(EventSource {
            name: name.to_string(),
            description: description.to_string(),
            pending: false,
            enabled: false,
        });
        self.sources.len() - 1
    }

    pub fn sources(&self) -> &[EventSource] {
        &self.sources
    }

    /// Bit index of a source by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.name == name)
    }

    /// Latch trigger pulses at the clock edge (one flag per source).
    pub fn commit(&mut self, triggers: &[bool]) {
        for (source, &trigger) in self.sources.iter_mut().zip(triggers) {
            if trigger && !source.pending {
                log::debug!("Event '{}' pending: {}", source.name, source.description);
                source.pending = true;
            }
        }
    }

    /// Pending mask.
    pub fn pending(&self) -> u64 {
        self.mask(|s| s.pending)
    }

    /// Enable mask.
    pub fn enabled(&self) -> u64 {
        self.mask(|s| s.enabled)
    }

    /// Host write to the pending register: each 1 bit clears that event.
    pub fn clear_pending(&mut self, mask: u64) {
        for (i, source) in self.sources.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                source.pending = false;
            }
        }
    }

    /// Host write to the enable register.
    pub fn set_enable(&mut self, mask: u64) {
        for (i, source) in self.sources.iter_mut().enumerate() {
            source.enabled = mask & (1 << i) != 0;
        }
    }

    /// Interrupt line: any enabled event pending.
    pub fn irq(&self) -> bool {
        self.sources.iter().any(|s| s.pending && s.enabled)
    }

    fn mask(&self, bit: impl Fn(&EventSource) -> bool) -> u64 {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, s)| bit(s))
            .fold(0, |m, (i, _)| m | (1 << i))
    }
}
