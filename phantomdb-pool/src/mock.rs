//! Scriptable connection manager for unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::manager::ManageConnection;

#[derive(Debug, thiserror::Error)]
#[error("mock connection refused")]
pub(crate) struct MockError;

#[derive(Debug)]
pub(crate) struct MockConn {
    pub(crate) serial: usize,
}

#[derive(Default)]
struct MockState {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    /// Outcomes of upcoming connection attempts, succeed when empty.
    plan: Mutex<VecDeque<bool>>,
    delay: Option<Duration>,
}

/// Connection manager which counts opened and closed connections.
#[derive(Clone, Default)]
pub(crate) struct MockManager(Arc<MockState>);

impl MockManager {
    /// Every connection attempt takes this long.
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self(Arc::new(MockState {
            delay: Some(delay),
            ..MockState::default()
        }))
    }

    pub(crate) fn plan(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.0.plan.lock().extend(outcomes);
    }

    pub(crate) fn fail_next(&self) {
        self.plan([false]);
    }

    /// Connections opened successfully.
    pub(crate) fn created(&self) -> usize {
        self.0.created.load(Ordering::SeqCst)
    }

    pub(crate) fn destroyed(&self) -> usize {
        self.0.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ManageConnection for MockManager {
    type Connection = MockConn;
    type Error = MockError;

    async fn connect(&self) -> Result<MockConn, MockError> {
        if let Some(delay) = self.0.delay {
            tokio::time::sleep(delay).await;
        }
        let succeed = self.0.plan.lock().pop_front().unwrap_or(true);
        if !succeed {
            return Err(MockError);
        }
        let serial = self.0.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConn { serial })
    }

    fn disconnect(&self, conn: MockConn) {
        self.0.destroyed.fetch_add(1, Ordering::SeqCst);
        drop(conn);
    }
}
