use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

/// Dispatch priority in `0..=4`, where 4 is the most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const LOWEST: Priority = Priority(0);
    pub const DEFAULT: Priority = Priority(2);
    pub const URGENT: Priority = Priority(4);

    pub const LEVELS: usize = 5;

    pub fn new(value: i32) -> Self {
        Self(value.clamp(0, Self::URGENT.0 as i32) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn boosted(self) -> Self {
        Self::new(self.0 as i32 + 1)
    }

    pub fn is_urgent(self) -> bool {
        self >= Self::URGENT
    }

    /// Levels from most to least urgent.
    pub fn descending() -> impl Iterator<Item = Priority> {
        (0..Self::LEVELS as u8).rev().map(Priority)
    }

    /// Levels from least to most urgent.
    pub fn ascending() -> impl Iterator<Item = Priority> {
        (0..Self::LEVELS as u8).map(Priority)
    }

    pub fn default_max_retries(self) -> u32 {
        match self.0 {
            4 => 5,
            3 => 4,
            2 => 3,
            1 => 2,
            _ => 1,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerTier {
    #[default]
    Standard,
    Premium,
    Vip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessImpact {
    #[default]
    Low,
    Medium,
    High,
}

/// Caller-supplied hints that raise a notification's priority.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorityHints {
    #[serde(default)]
    pub is_vip: bool,

    #[serde(default)]
    pub is_owner: bool,

    #[serde(default)]
    pub customer_tier: CustomerTier,

    #[serde(default)]
    pub business_impact: BusinessImpact,
}
