//! Reconciliation status published to UI hosts.

/// Where the task reconciliation loop currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SyncState {
    /// The loop is not running (not started yet, or shut down).
    #[default]
    Offline,
    /// Local changes are being pushed.
    Syncing,
    /// The last push settled without failures.
    Synced,
    /// At least one upsert of the last push failed; local state is kept.
    Error,
}

impl SyncState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}
