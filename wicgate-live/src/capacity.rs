use serde::Serialize;

/// Player slots on a game server.
pub const SERVER_MAX_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityStatus {
  Full,
  Busy,
  Available,
}

/// Fill percentages at which a server counts as full or busy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityThresholds {
  pub full: f64,
  pub busy: f64,
}

impl Default for CapacityThresholds {
  fn default() -> Self {
    Self {
      full: 90.0,
      busy: 50.0,
    }
  }
}

fn fill(count: usize, max: usize) -> f64 {
  if max == 0 {
    return 100.0;
  }
  count as f64 / max as f64 * 100.0
}

impl CapacityThresholds {
  pub fn status(&self, count: usize, max: usize) -> CapacityStatus {
    let pct = fill(count, max);
    if pct >= self.full {
      CapacityStatus::Full
    } else if pct >= self.busy {
      CapacityStatus::Busy
    } else {
      CapacityStatus::Available
    }
  }
}

/// Status with the default thresholds.
pub fn status(count: usize, max: usize) -> CapacityStatus {
  CapacityThresholds::default().status(count, max)
}

/// Rounded fill percentage.
pub fn percentage(count: usize, max: usize) -> u32 {
  fill(count, max).round() as u32
}

pub fn has_space(count: usize, max: usize) -> bool {
  count < max
}
