use serde::Serialize;

/// Point-in-time snapshot of pool occupancy.
///
/// Counts are read under the same lock that guards acquisition and release, so they are always
/// mutually consistent: `available + in_use <= max`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Connections sitting idle in the pool.
    pub available: usize,
    /// Connections currently checked out.
    pub in_use: usize,
    /// Configured number of connections opened on warm-up.
    pub min: usize,
    /// Configured maximum number of connections.
    pub max: usize,
}

impl PoolStatus {
    /// Current total (`available` + `in_use`) number of connections.
    #[must_use]
    pub fn size(&self) -> usize {
        self.available + self.in_use
    }

    /// Whether there are no idle connections and no room to open new ones.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.available == 0 && self.in_use >= self.max
    }
}
