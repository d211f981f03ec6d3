//! Owned simulator connection with guaranteed release.

use tracing::debug;

use crate::sim::{NotificationKind, SimConnection, SimError};

/// Single owner of an open connection and its notification subscriptions.
///
/// Closing unsubscribes every handler, newest first, and only then releases the
/// native handle. Closing twice is a no-op, and dropping an open session closes it.
pub struct SimSession {
    connection: Option<Box<dyn SimConnection>>,
    subscriptions: Vec<NotificationKind>,
}

impl SimSession {
    pub fn new(connection: Box<dyn SimConnection>) -> Self {
        Self {
            connection: Some(connection),
            subscriptions: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Fails if the session is closed or the simulator rejects the subscription.
    pub fn subscribe(&mut self, kind: NotificationKind) -> Result<(), SimError> {
        self.connection()?.subscribe(kind)?;
        self.subscriptions.push(kind);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SimError::Closed`] after `close`.
    pub fn connection(&mut self) -> Result<&mut (dyn SimConnection + 'static), SimError> {
        self.connection.as_deref_mut().ok_or(SimError::Closed)
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    pub fn subscriptions(&self) -> &[NotificationKind] {
        &self.subscriptions
    }

    pub fn close(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        while let Some(kind) = self.subscriptions.pop() {
            connection.unsubscribe(kind);
        }
        connection.close();
        debug!("Simulator session closed");
    }
}

impl Drop for SimSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SimSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimSession")
            .field("open", &self.is_open())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}
