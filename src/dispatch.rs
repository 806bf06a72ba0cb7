//! Single-consumer dispatch queue.
//!
//! Worker tasks and engine operations never touch the client directly. They
//! post [`Job`]s to an unbounded mpsc channel; one dispatcher task per
//! `open()` drains it and runs each job against the engine state, invoking
//! client callbacks without holding any engine lock.
//!
//! ```text
//! open/connect/...  ─┐
//! connect task      ─┼─► mpsc::UnboundedSender<Job> ─► Dispatcher ─► HrClient
//! read task         ─┘
//! ```
//!
//! The dispatcher stops once every sender is gone: `close()` drops the
//! engine's sender and finished tasks drop theirs.

use std::sync::Weak;

use tokio::sync::mpsc;

use crate::engine::Shared;
use crate::error::TransportError;
use crate::notify::{DisconnectReason, HrClient, Notification};
use crate::transport::Adapter;

/// Unit of work for the dispatcher.
pub(crate) enum Job<A: Adapter> {
    /// Deliver a notification as-is.
    Notify(Notification),
    /// Replace the client for every later job.
    Rebind(Box<dyn HrClient>),
    /// Publish the next paired device of scan `scan`.
    ///
    /// `devices` is `None` on the first step; the adapter is enumerated then.
    ScanStep {
        scan: u64,
        devices: Option<A::Devices>,
    },
    /// The connect task of session `epoch` succeeded.
    Connected { epoch: u64 },
    /// The connect task of session `epoch` failed.
    ConnectFailed { epoch: u64, error: TransportError },
    /// The read task of session `epoch` stopped.
    ReadEnded {
        epoch: u64,
        reason: DisconnectReason,
    },
}

impl<A: Adapter> std::fmt::Debug for Job<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Notify(n) => f.debug_tuple("Notify").field(n).finish(),
            Job::Rebind(_) => f.write_str("Rebind"),
            Job::ScanStep { scan, .. } => f.debug_struct("ScanStep").field("scan", scan).finish(),
            Job::Connected { epoch } => f.debug_struct("Connected").field("epoch", epoch).finish(),
            Job::ConnectFailed { epoch, error } => f
                .debug_struct("ConnectFailed")
                .field("epoch", epoch)
                .field("error", error)
                .finish(),
            Job::ReadEnded { epoch, reason } => f
                .debug_struct("ReadEnded")
                .field("epoch", epoch)
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Sending half of the dispatch queue.
pub(crate) type JobSender<A> = mpsc::UnboundedSender<Job<A>>;

/// Hand a notification to the client.
pub(crate) fn deliver(client: &dyn HrClient, notification: Notification) {
    match notification {
        Notification::OpenResult(ok) => client.on_open_result(ok),
        Notification::ScanResult {
            provider_name,
            device,
        } => client.on_scan_result(&provider_name, device),
        Notification::ConnectResult(ok) => client.on_connect_result(ok),
        Notification::Disconnected(reason) => client.on_disconnected(reason),
    }
}

/// Dispatcher loop - drains the queue in order until every sender is dropped.
pub(crate) async fn dispatch_loop<A: Adapter>(
    shared: Weak<Shared<A>>,
    mut client: Box<dyn HrClient>,
    mut rx: mpsc::UnboundedReceiver<Job<A>>,
) {
    while let Some(job) = rx.recv().await {
        let job = match job {
            Job::Rebind(next) => {
                tracing::debug!("Client replaced");
                client = next;
                continue;
            }
            job => job,
        };

        let Some(shared) = shared.upgrade() else {
            tracing::debug!("Engine dropped, stopping dispatcher");
            break;
        };

        tracing::trace!(?job, "Dispatching");
        shared.run_job(job, client.as_ref());
    }

    tracing::debug!("Dispatcher stopped");
}
