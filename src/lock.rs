//! Per-user distributed lock
//!
//! One lock instance guards one user for one transaction. Acquisition
//! writes a random token under the user's lock key with a TTL, so a
//! crashed holder never wedges the user: the key expires and the next
//! acquirer takes over. Release deletes the key only when it still
//! holds this instance's token.
//!
//! The lock does not release itself on drop. Callers own the release
//! path and must run it on success and failure alike.

use std::time::{Duration, Instant};
use tokio::time::sleep;
use uuid::Uuid;

use crate::error::{LockFailure, Result};
use crate::store::FastStore;

pub struct UserLock<'a, F: FastStore + ?Sized> {
    store: &'a F,
    key: String,
    validity: Duration,
    token: Option<String>,
    acquired_at: Option<Instant>,
}

impl<'a, F: FastStore + ?Sized> UserLock<'a, F> {
    /// Lock over `key` whose holder may work for at most `validity`
    pub fn new(store: &'a F, key: impl Into<String>, validity: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            validity,
            token: None,
            acquired_at: None,
        }
    }

    /// Try to take the lock.
    ///
    /// Non-blocking mode returns `Ok(false)` on contention. Blocking
    /// mode retries every `poll_interval` until `timeout` has passed,
    /// then fails with [`LockFailure::AcquireTimeout`].
    pub async fn acquire(
        &mut self,
        blocking: bool,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<bool> {
        if self.token.is_some() {
            return Err(LockFailure::AlreadyAcquired.into());
        }

        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + timeout;

        loop {
            if self
                .store
                .set_if_absent(&self.key, &token, self.validity)
                .await?
            {
                self.token = Some(token);
                self.acquired_at = Some(Instant::now());
                return Ok(true);
            }
            if !blocking {
                return Ok(false);
            }
            if Instant::now() >= deadline {
                return Err(LockFailure::AcquireTimeout(timeout.as_millis() as u64).into());
            }
            sleep(poll_interval).await;
        }
    }

    /// Give the lock back. Fails with [`LockFailure::NotOwner`] when the
    /// key expired and another holder took over; the local held state is
    /// cleared either way.
    pub async fn release(&mut self) -> Result<()> {
        let token = self.token.take().ok_or(LockFailure::NotHeld)?;
        self.acquired_at = None;

        if self.store.compare_and_delete(&self.key, &token).await? {
            Ok(())
        } else {
            Err(LockFailure::NotOwner.into())
        }
    }

    /// Confirm the holder is still inside its validity window. Checked
    /// against the local wall clock, so it stays meaningful even after
    /// the store-side TTL has let the key lapse.
    pub fn check_validity(&self) -> Result<()> {
        let acquired_at = self.acquired_at.ok_or(LockFailure::NotHeld)?;
        if acquired_at.elapsed() >= self.validity {
            return Err(LockFailure::ValidityExpired.into());
        }
        Ok(())
    }

    pub fn is_held(&self) -> bool {
        self.token.is_some()
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
