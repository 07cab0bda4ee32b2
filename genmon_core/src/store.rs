//! Register cache and change detection.
//!
//! The store only ever holds complete values: `update` validates the hex
//! length against the register class before anything is replaced.

use crate::registers::{self, RegisterClass};
use std::collections::{BTreeMap, HashMap};

/// Read access to register values, implemented by the live store and by
/// plain snapshots so the decoders work on either.
pub trait RegisterView {
    fn value(&self, address: u16) -> Option<&str>;
}

impl RegisterView for BTreeMap<u16, String> {
    fn value(&self, address: u16) -> Option<&str> {
        self.get(&address).map(String::as_str)
    }
}

impl RegisterView for HashMap<u16, String> {
    fn value(&self, address: u16) -> Option<&str> {
        self.get(&address).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Base or prime register
    Known,
    /// Log window or model register
    Log,
    /// Address outside the tables, seen by the debug scan
    UnderTest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub address: u16,
    pub old: String,
    pub new: String,
    pub kind: ChangeKind,
}

impl Change {
    pub fn notifies(&self) -> bool {
        self.kind != ChangeKind::Log
    }

    /// XOR of the old and new values, for under-test reporting.
    pub fn mask(&self) -> u64 {
        let old = u64::from_str_radix(&self.old, 16).unwrap_or(0);
        let new = u64::from_str_radix(&self.new, 16).unwrap_or(0);
        old ^ new
    }

    pub fn bits_changed(&self) -> u32 {
        self.mask().count_ones()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Wrong length for the register class; nothing stored.
    Rejected { expected: usize, actual: usize },
    /// Neither a known register nor a one-word probe result.
    Unknown,
    First,
    Unchanged,
    Changed(Change),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub changed: u64,
    pub unchanged: u64,
}

impl StoreStats {
    /// `changed / unchanged`, 0 until something has stayed the same.
    pub fn ratio(&self) -> f64 {
        if self.unchanged == 0 {
            0.0
        } else {
            self.changed as f64 / self.unchanged as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterStore {
    evolution: bool,
    values: HashMap<u16, String>,
    under_test: HashMap<u16, String>,
    stats: StoreStats,
}

impl RegisterStore {
    pub fn new(evolution: bool) -> Self {
        Self {
            evolution,
            ..Self::default()
        }
    }

    /// Switch the family used to gate log windows. Called once the
    /// controller has been identified.
    pub fn set_evolution(&mut self, evolution: bool) {
        self.evolution = evolution;
    }

    pub fn class_of(&self, address: u16) -> Option<RegisterClass> {
        registers::classify(address, self.evolution)
    }

    pub fn update(&mut self, address: u16, raw: &str) -> UpdateOutcome {
        let raw = raw.to_ascii_lowercase();
        let Some(class) = self.class_of(address) else {
            return self.update_under_test(address, raw);
        };
        let expected = class.hex_len();
        if raw.len() != expected || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return UpdateOutcome::Rejected {
                expected,
                actual: raw.len(),
            };
        }

        match self.values.get_mut(&address) {
            None => {
                self.values.insert(address, raw);
                UpdateOutcome::First
            }
            Some(current) if *current == raw => {
                self.stats.unchanged += 1;
                UpdateOutcome::Unchanged
            }
            Some(current) => {
                self.stats.changed += 1;
                let old = std::mem::replace(current, raw.clone());
                UpdateOutcome::Changed(Change {
                    address,
                    old,
                    new: raw,
                    kind: if class.is_log() {
                        ChangeKind::Log
                    } else {
                        ChangeKind::Known
                    },
                })
            }
        }
    }

    fn update_under_test(&mut self, address: u16, raw: String) -> UpdateOutcome {
        if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return UpdateOutcome::Unknown;
        }
        match self.under_test.insert(address, raw.clone()) {
            None => UpdateOutcome::First,
            Some(old) if old == raw => UpdateOutcome::Unchanged,
            Some(old) => UpdateOutcome::Changed(Change {
                address,
                old,
                new: raw,
                kind: ChangeKind::UnderTest,
            }),
        }
    }

    pub fn get(&self, address: u16) -> Option<String> {
        self.values.get(&address).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sorted copy of every known register.
    pub fn snapshot(&self) -> BTreeMap<u16, String> {
        self.values
            .iter()
            .map(|(a, v)| (*a, v.clone()))
            .collect()
    }

    pub fn under_test(&self) -> BTreeMap<u16, String> {
        self.under_test
            .iter()
            .map(|(a, v)| (*a, v.clone()))
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }
}

impl RegisterView for RegisterStore {
    fn value(&self, address: u16) -> Option<&str> {
        self.values.get(&address).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_value_is_not_counted() {
        let mut s = RegisterStore::new(true);
        assert_eq!(s.update(0x0005, "0d1e"), UpdateOutcome::First);
        assert_eq!(s.stats(), StoreStats::default());
        assert_eq!(s.update(0x0005, "0D1E"), UpdateOutcome::Unchanged);
        assert_eq!(s.stats().unchanged, 1);
    }

    #[test]
    fn log_changes_are_counted_but_quiet() {
        let mut s = RegisterStore::new(true);
        s.update(0x012c, "2e011e0d0a001811");
        let UpdateOutcome::Changed(c) = s.update(0x012c, "2f011e0d0a001811") else {
            panic!("expected a change");
        };
        assert!(!c.notifies());
        assert_eq!(s.stats().changed, 1);
    }

    #[test]
    fn under_test_area_leaves_counters_alone() {
        let mut s = RegisterStore::new(true);
        assert_eq!(s.update(0x0100, "0001"), UpdateOutcome::First);
        let UpdateOutcome::Changed(c) = s.update(0x0100, "0003") else {
            panic!("expected a change");
        };
        assert_eq!(c.kind, ChangeKind::UnderTest);
        assert_eq!(c.bits_changed(), 1);
        assert_eq!(c.mask(), 0x2);
        assert_eq!(s.stats(), StoreStats::default());
        assert!(s.get(0x0100).is_none());
        assert_eq!(s.under_test().len(), 1);
        assert_eq!(s.update(0x0100, "000300"), UpdateOutcome::Unknown);
    }

    #[test]
    fn non_hex_is_rejected() {
        let mut s = RegisterStore::new(false);
        assert!(matches!(
            s.update(0x0009, "00zz"),
            UpdateOutcome::Rejected { expected: 4, .. }
        ));
        assert!(s.is_empty());
    }

    #[test]
    fn ratio_is_zero_without_unchanged() {
        let st = StoreStats {
            changed: 3,
            unchanged: 0,
        };
        assert_eq!(st.ratio(), 0.0);
        let st = StoreStats {
            changed: 3,
            unchanged: 4,
        };
        assert!((st.ratio() - 0.75).abs() < 1e-9);
    }
}
