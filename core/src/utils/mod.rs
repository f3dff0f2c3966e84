pub mod payloads;

use rand::Rng;
use std::collections::HashSet;

pub const TRIGGER_LEN: usize = 9;

/// Nine random lowercase letters, used to spot reflection.
pub fn make_reflect_trigger<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..TRIGGER_LEN)
        .map(|_| rng.random_range(b'a'..=b'z') as char)
        .collect()
}

/// A nine-digit number, used to spot script execution.
pub fn make_xss_trigger<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.random_range(100_000_000u32..=999_999_999u32).to_string()
}

/// Hands out triggers that are never repeated within one assessment.
#[derive(Debug, Default)]
pub struct TriggerFactory {
    issued: HashSet<String>,
}

impl TriggerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the factory with triggers already in use.
    pub fn with_issued<'a>(issued: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            issued: issued.into_iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Marks an externally supplied trigger as taken.
    pub fn reserve(&mut self, trigger: &str) -> bool {
        self.issued.insert(trigger.to_string())
    }

    pub fn next_reflect_trigger(&mut self) -> String {
        let mut rng = rand::rng();
        loop {
            let trigger = make_reflect_trigger(&mut rng);
            if self.issued.insert(trigger.clone()) {
                return trigger;
            }
        }
    }

    pub fn next_xss_trigger(&mut self) -> String {
        let mut rng = rand::rng();
        loop {
            let trigger = make_xss_trigger(&mut rng);
            if self.issued.insert(trigger.clone()) {
                return trigger;
            }
        }
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}
