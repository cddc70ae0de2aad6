//! Pinned nodes: values polled on an interval with a bounded history.
//!
//! The first successful read of a pin decides how its history is ordered.
//! A class comparator wins; otherwise the value's shape is guessed (decimal
//! first, then hex). Values that fit neither get no history. Min and max
//! are tracked as the ring buffer rolls.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use strum::Display;

use crate::class::CompareFn;
use crate::engine::Engine;
use crate::node::{Node, guess_base};
use crate::path;

/// How a pin's history is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum HistoryMode {
    /// No successful read yet.
    Undetermined,
    /// Values do not compare; history is not kept.
    Disabled,
    /// Ordered by the class comparator.
    Compare,
    /// Ordered as decimal integers.
    GuessDec,
    /// Ordered as hexadecimal integers.
    GuessHex,
}

/// One recorded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub value: String,
    pub at: Instant,
}

#[derive(Debug, Clone)]
struct History {
    ring: VecDeque<Sample>,
    capacity: usize,
    min: Option<usize>,
    max: Option<usize>,
}

impl History {
    fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
            min: None,
            max: None,
        }
    }

    fn push(&mut self, sample: Sample, cmp: impl Fn(&str, &str) -> Ordering) {
        if self.capacity == 0 {
            return;
        }
        let mut rescan = false;
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
            self.min = self.min.and_then(|i| i.checked_sub(1));
            self.max = self.max.and_then(|i| i.checked_sub(1));
            rescan = self.min.is_none() || self.max.is_none();
        }
        self.ring.push_back(sample);
        let new = self.ring.len() - 1;

        if rescan || self.min.is_none() {
            self.rescan(&cmp);
            return;
        }
        let value = &self.ring[new].value;
        if let Some(min) = self.min {
            if cmp(value, &self.ring[min].value) == Ordering::Less {
                self.min = Some(new);
            }
        }
        if let Some(max) = self.max {
            if cmp(value, &self.ring[max].value) == Ordering::Greater {
                self.max = Some(new);
            }
        }
    }

    fn rescan(&mut self, cmp: &impl Fn(&str, &str) -> Ordering) {
        let (mut min, mut max) = (0, 0);
        for (i, sample) in self.ring.iter().enumerate().skip(1) {
            if cmp(&sample.value, &self.ring[min].value) == Ordering::Less {
                min = i;
            }
            if cmp(&sample.value, &self.ring[max].value) == Ordering::Greater {
                max = i;
            }
        }
        let any = !self.ring.is_empty();
        self.min = any.then_some(min);
        self.max = any.then_some(max);
    }
}

fn cmp_decimal(a: &str, b: &str) -> Ordering {
    match (a.parse::<i128>(), b.parse::<i128>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => path::natural_cmp(a, b),
    }
}

fn cmp_hex(a: &str, b: &str) -> Ordering {
    fn parse(s: &str) -> Option<u128> {
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        u128::from_str_radix(digits, 16).ok()
    }
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => path::natural_cmp(a, b),
    }
}

/// A node watched on an interval.
#[derive(Debug, Clone)]
pub struct Pin {
    path: String,
    node: Node,
    interval: Duration,
    last_poll: Option<Instant>,
    last_update: Option<Instant>,
    mode: HistoryMode,
    compare: Option<CompareFnDebug>,
    history: History,
}

// CompareFn has no Debug; wrap it so Pin can derive.
#[derive(Clone)]
struct CompareFnDebug(CompareFn);

impl std::fmt::Debug for CompareFnDebug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CompareFn")
    }
}

impl Pin {
    /// Pin `path`, polling every `interval`. A zero interval polls once.
    pub fn new(engine: &Engine, path: &str, interval: Duration, history_len: usize) -> Self {
        Self {
            path: path.to_string(),
            node: engine.resolve(path, None),
            interval,
            last_poll: None,
            last_update: None,
            mode: HistoryMode::Undetermined,
            compare: None,
            history: History::new(history_len),
        }
    }

    /// Poll if due (or if `force`). Returns true when a new value was read.
    ///
    /// A node that did not exist is resolved again first, so a pin picks up
    /// a device that appears after it was created.
    pub fn update(&mut self, engine: &Engine, force: bool) -> bool {
        let now = Instant::now();
        let due = force
            || match self.last_poll {
                None => true,
                Some(_) if self.interval.is_zero() => false,
                Some(last) => now.duration_since(last) >= self.interval,
            };
        if !due {
            return false;
        }
        self.last_poll = Some(now);

        if !self.node.exists() {
            self.node = engine.resolve(&self.path, None);
        }
        if !engine.read(&mut self.node, true) {
            return false;
        }
        self.last_update = Some(now);

        let value = self.value().unwrap_or_default().to_string();
        if self.mode == HistoryMode::Undetermined {
            self.decide_mode(engine, &value);
        }
        let sample = Sample { value, at: now };
        match self.mode {
            HistoryMode::Compare => {
                if let Some(CompareFnDebug(f)) = &self.compare {
                    let f = f.clone();
                    self.history.push(sample, |a, b| f(a, b));
                }
            }
            HistoryMode::GuessDec => self.history.push(sample, cmp_decimal),
            HistoryMode::GuessHex => self.history.push(sample, cmp_hex),
            HistoryMode::Disabled | HistoryMode::Undetermined => {}
        }
        true
    }

    fn decide_mode(&mut self, engine: &Engine, value: &str) {
        if let Some(f) = engine.class_of(&self.node).and_then(|c| c.comparator()) {
            self.compare = Some(CompareFnDebug(f.clone()));
            self.mode = HistoryMode::Compare;
        } else {
            self.mode = match self.node.data().text().and_then(guess_base) {
                Some(10) => HistoryMode::GuessDec,
                Some(16) => HistoryMode::GuessHex,
                _ => HistoryMode::Disabled,
            };
        }
        tracing::debug!(path = %self.path, mode = %self.mode, "pin history mode");
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mode(&self) -> HistoryMode {
        self.mode
    }

    /// When a value was last read successfully.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// The current value, trimmed.
    pub fn value(&self) -> Option<&str> {
        self.node.data().text().map(str::trim)
    }

    /// Recorded samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Sample> {
        self.history.ring.iter()
    }

    pub fn min(&self) -> Option<&Sample> {
        self.history.min.and_then(|i| self.history.ring.get(i))
    }

    pub fn max(&self) -> Option<&Sample> {
        self.history.max.and_then(|i| self.history.ring.get(i))
    }
}

/// A set of pins sharing a start time.
#[derive(Debug, Clone)]
pub struct PinList {
    pins: Vec<Pin>,
    started: Instant,
    history_len: usize,
    shortest: Option<Duration>,
    longest: Option<Duration>,
}

impl PinList {
    pub fn new(history_len: usize) -> Self {
        Self {
            pins: Vec::new(),
            started: Instant::now(),
            history_len,
            shortest: None,
            longest: None,
        }
    }

    /// Pin `path`; returns its index.
    pub fn add(&mut self, engine: &Engine, path: &str, interval: Duration) -> usize {
        self.pins.push(Pin::new(engine, path, interval, self.history_len));
        self.recompute_extremes();
        self.pins.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Option<Pin> {
        if index >= self.pins.len() {
            return None;
        }
        let pin = self.pins.remove(index);
        self.recompute_extremes();
        Some(pin)
    }

    /// Index of the pin on `path`.
    pub fn find(&self, path: &str) -> Option<usize> {
        self.pins.iter().position(|p| p.path == path)
    }

    pub fn get(&self, index: usize) -> Option<&Pin> {
        self.pins.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pin> {
        self.pins.iter()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Poll every due pin; returns how many got a new value.
    pub fn update_all(&mut self, engine: &Engine, force: bool) -> usize {
        self.pins
            .iter_mut()
            .map(|pin| pin.update(engine, force))
            .filter(|&updated| updated)
            .count()
    }

    /// Time since the list was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Shortest non-zero interval among the pins.
    pub fn shortest_interval(&self) -> Option<Duration> {
        self.shortest
    }

    /// Longest interval among the pins.
    pub fn longest_interval(&self) -> Option<Duration> {
        self.longest
    }

    /// The pin at `index` if it got a value within the last `window`.
    pub fn pin_if_updated_since(&self, index: usize, window: Duration) -> Option<&Pin> {
        let pin = self.pins.get(index)?;
        let at = pin.last_update?;
        (at.elapsed() <= window).then_some(pin)
    }

    fn recompute_extremes(&mut self) {
        let intervals: Vec<Duration> = self
            .pins
            .iter()
            .map(|p| p.interval)
            .filter(|d| !d.is_zero())
            .collect();
        self.shortest = intervals.iter().min().copied();
        self.longest = intervals.iter().max().copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use crate::class::Class;
    use crate::config::EngineConfig;
    use crate::vo::{VirtualObject, VoType};

    /// An engine whose `:/seq` yields `values` in turn, then repeats the last.
    fn sequence(values: &[&str], class: Option<Class>) -> Engine {
        let values: Vec<String> = values.iter().map(|s| s.to_string()).collect();
        let next = Arc::new(AtomicUsize::new(0));
        let mut b = Engine::builder(EngineConfig::default().with_builtins(false));
        b.add_virtual(VirtualObject::callback(":/seq", VoType::STRING, move |p| {
            p?;
            let i = next.fetch_add(1, AtomicOrdering::SeqCst).min(values.len() - 1);
            Some(format!("{}\n", values[i]))
        }));
        if let Some(class) = class {
            b.register_class(class).unwrap();
        }
        b.build().unwrap()
    }

    fn feed(engine: &Engine, pin: &mut Pin, n: usize) {
        for _ in 0..n {
            assert!(pin.update(engine, true));
        }
    }

    #[test]
    fn test_decimal_history() {
        let engine = sequence(&["10", "11", "12"], None);
        let mut pin = Pin::new(&engine, ":/seq", Duration::from_secs(1), 10);
        feed(&engine, &mut pin, 3);
        assert_eq!(pin.mode(), HistoryMode::GuessDec);
        assert_eq!(pin.max().unwrap().value, "12");
        assert_eq!(pin.min().unwrap().value, "10");
    }

    #[test]
    fn test_hex_history() {
        let engine = sequence(&["a", "b", "1f"], None);
        let mut pin = Pin::new(&engine, ":/seq", Duration::from_secs(1), 10);
        feed(&engine, &mut pin, 3);
        assert_eq!(pin.mode(), HistoryMode::GuessHex);
        assert_eq!(pin.max().unwrap().value, "1f");
        assert_eq!(pin.min().unwrap().value, "a");
    }

    #[test]
    fn test_decimal_beats_hex_when_both_fit() {
        // "9" and "10" are valid hex too; decimal is checked first
        let engine = sequence(&["9", "10"], None);
        let mut pin = Pin::new(&engine, ":/seq", Duration::from_secs(1), 10);
        feed(&engine, &mut pin, 2);
        assert_eq!(pin.mode(), HistoryMode::GuessDec);
        assert_eq!(pin.max().unwrap().value, "10");
    }

    #[test]
    fn test_text_disables_history() {
        let engine = sequence(&["performance", "powersave"], None);
        let mut pin = Pin::new(&engine, ":/seq", Duration::from_secs(1), 10);
        feed(&engine, &mut pin, 2);
        assert_eq!(pin.mode(), HistoryMode::Disabled);
        assert_eq!(pin.history().count(), 0);
        assert_eq!(pin.value(), Some("powersave"));
    }

    #[test]
    fn test_class_comparator_wins() {
        let by_len = Class::new("seq", ":/seq").compare(|a, b| a.len().cmp(&b.len()));
        let engine = sequence(&["1", "999", "55"], Some(by_len));
        let mut pin = Pin::new(&engine, ":/seq", Duration::from_secs(1), 10);
        feed(&engine, &mut pin, 3);
        assert_eq!(pin.mode(), HistoryMode::Compare);
        assert_eq!(pin.max().unwrap().value, "999");
        assert_eq!(pin.min().unwrap().value, "1");
    }

    #[test]
    fn test_eviction_rescans_extremes() {
        let engine = sequence(&["50", "1", "20", "30", "40"], None);
        let mut pin = Pin::new(&engine, ":/seq", Duration::from_secs(1), 3);
        feed(&engine, &mut pin, 3);
        assert_eq!(pin.max().unwrap().value, "50");
        assert_eq!(pin.min().unwrap().value, "1");

        // "50" falls out
        feed(&engine, &mut pin, 1);
        assert_eq!(pin.max().unwrap().value, "30");
        assert_eq!(pin.min().unwrap().value, "1");

        // "1" falls out
        feed(&engine, &mut pin, 1);
        assert_eq!(pin.min().unwrap().value, "20");
        assert_eq!(pin.max().unwrap().value, "40");
        let values: Vec<&str> = pin.history().map(|s| s.value.as_str()).collect();
        assert_eq!(values, vec!["20", "30", "40"]);
    }

    #[test]
    fn test_zero_interval_polls_once() {
        let engine = sequence(&["1", "2"], None);
        let mut pin = Pin::new(&engine, ":/seq", Duration::ZERO, 10);
        assert!(pin.update(&engine, false));
        assert!(!pin.update(&engine, false));
        assert_eq!(pin.value(), Some("1"));
        assert!(pin.update(&engine, true));
        assert_eq!(pin.value(), Some("2"));
    }

    #[test]
    fn test_missing_node_is_reresolved() {
        let engine = sequence(&["1"], None);
        let mut pin = Pin::new(&engine, ":/late", Duration::from_secs(1), 10);
        assert!(!pin.update(&engine, true));
        engine.add_virtual(VirtualObject::string(":/late", "7"));
        assert!(pin.update(&engine, true));
        assert_eq!(pin.value(), Some("7"));
    }

    #[test]
    fn test_pin_list() {
        let engine = sequence(&["1", "2", "3"], None);
        let mut pins = PinList::new(10);
        let a = pins.add(&engine, ":/seq", Duration::from_secs(2));
        let b = pins.add(&engine, ":/missing", Duration::from_millis(500));
        pins.add(&engine, ":/seq", Duration::ZERO);
        assert_eq!(pins.shortest_interval(), Some(Duration::from_millis(500)));
        assert_eq!(pins.longest_interval(), Some(Duration::from_secs(2)));

        assert_eq!(pins.update_all(&engine, false), 2);
        assert!(pins.pin_if_updated_since(a, Duration::from_secs(60)).is_some());
        assert!(pins.pin_if_updated_since(b, Duration::from_secs(60)).is_none());
        assert_eq!(pins.find(":/missing"), Some(b));

        pins.remove(b);
        assert_eq!(pins.shortest_interval(), Some(Duration::from_secs(2)));
        assert_eq!(pins.len(), 2);
    }
}
