//! Remote reachability and account availability.

use crate::remote::RemoteReplica;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What the remote availability service reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    /// The account is usable.
    Available,
    /// No account is signed in.
    NoAccount,
    /// The account exists but may not be used.
    Restricted,
    /// The service could not tell.
    CouldNotDetermine,
    /// The service is temporarily unavailable.
    TemporarilyUnavailable,
}

/// Connectivity state of the remote replica as this replica sees it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountStatus {
    /// No check has completed yet.
    #[default]
    Unknown,
    /// Sync may proceed.
    Available,
    /// No account is signed in.
    NoAccount,
    /// The account may not be used.
    Restricted,
    /// The service could not tell.
    CouldNotDetermine,
    /// The service or an exchange is temporarily unavailable.
    TemporarilyUnavailable,
    /// The remote could not be reached at all.
    Offline,
}

impl AccountStatus {
    /// Returns true if sync may proceed.
    pub fn is_available(self) -> bool {
        self == AccountStatus::Available
    }

    /// Returns true if the state is expected to clear up without user action.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            AccountStatus::Unknown
                | AccountStatus::CouldNotDetermine
                | AccountStatus::TemporarilyUnavailable
                | AccountStatus::Offline
        )
    }

    /// Returns the status name.
    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Unknown => "unknown",
            AccountStatus::Available => "available",
            AccountStatus::NoAccount => "noAccount",
            AccountStatus::Restricted => "restricted",
            AccountStatus::CouldNotDetermine => "couldNotDetermine",
            AccountStatus::TemporarilyUnavailable => "temporarilyUnavailable",
            AccountStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RemoteStatus> for AccountStatus {
    fn from(status: RemoteStatus) -> Self {
        match status {
            RemoteStatus::Available => AccountStatus::Available,
            RemoteStatus::NoAccount => AccountStatus::NoAccount,
            RemoteStatus::Restricted => AccountStatus::Restricted,
            RemoteStatus::CouldNotDetermine => AccountStatus::CouldNotDetermine,
            RemoteStatus::TemporarilyUnavailable => AccountStatus::TemporarilyUnavailable,
        }
    }
}

/// Tracks the remote's [`AccountStatus`].
///
/// The state starts as [`AccountStatus::Unknown`] and only changes through
/// [`ConnectivityMonitor::check`] or [`ConnectivityMonitor::record`]. A check
/// is bounded by a timeout and never hangs: a timeout or transport failure
/// resolves to [`AccountStatus::Offline`].
pub struct ConnectivityMonitor {
    remote: Arc<dyn RemoteReplica>,
    timeout: Duration,
    status: watch::Sender<AccountStatus>,
}

impl ConnectivityMonitor {
    /// Creates a monitor for `remote` whose checks give up after `timeout`.
    pub fn new(remote: Arc<dyn RemoteReplica>, timeout: Duration) -> Self {
        let (status, _) = watch::channel(AccountStatus::Unknown);
        Self {
            remote,
            timeout,
            status,
        }
    }

    /// Returns the last recorded status.
    pub fn status(&self) -> AccountStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<AccountStatus> {
        self.status.subscribe()
    }

    /// Asks the remote for its status and records the result.
    pub async fn check(&self) -> AccountStatus {
        let status = match tokio::time::timeout(self.timeout, self.remote.check_status()).await {
            Ok(Ok(status)) => AccountStatus::from(status),
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "status check failed");
                AccountStatus::Offline
            }
            Err(_) => {
                tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "status check timed out");
                AccountStatus::Offline
            }
        };
        self.record(status);
        status
    }

    /// Records a status observed elsewhere, such as an exchange timeout.
    pub fn record(&self, status: AccountStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            tracing::info!(from = %previous, to = %status, "remote status changed");
        }
    }
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("timeout", &self.timeout)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
