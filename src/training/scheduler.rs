use serde::{Deserialize, Serialize};

use crate::game::Side;

/// Decides which sides are trainable in each update iteration.
///
/// With alternation on, exactly one side trains at a time and the role flips
/// after `period` iterations. Otherwise the configured flags are used as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternatingScheduler {
    enabled: bool,
    period: usize,
    train_attacker: bool,
    train_defender: bool,
    /// Iterations since the last flip
    counter: usize,
}

impl AlternatingScheduler {
    /// When alternating, training starts with the attacker unless only the
    /// defender is configured as trainable.
    pub fn new(enabled: bool, period: usize, train_attacker: bool, train_defender: bool) -> Self {
        let (train_attacker, train_defender) = if enabled {
            if train_attacker || !train_defender {
                (true, false)
            } else {
                (false, true)
            }
        } else {
            (train_attacker, train_defender)
        };
        AlternatingScheduler {
            enabled,
            period: period.max(1),
            train_attacker,
            train_defender,
            counter: 0,
        }
    }

    pub fn is_trainable(&self, side: Side) -> bool {
        match side {
            Side::Attacker => self.train_attacker,
            Side::Defender => self.train_defender,
        }
    }

    pub fn is_alternating(&self) -> bool {
        self.enabled
    }

    /// Advance one update iteration. Returns true if the trainable side flipped.
    pub fn tick(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.counter += 1;
        if self.counter < self.period {
            return false;
        }
        self.counter = 0;
        self.train_attacker = !self.train_attacker;
        self.train_defender = !self.train_defender;
        true
    }
}
