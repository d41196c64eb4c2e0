use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::events::SignedEvent;

/// Outbound transport to the DAN control plane
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn publish(&self, event: &SignedEvent) -> RegistryResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Control plane unreachable; the event (and everything queued before
    /// it) is buffered for a later flush. Carries the buffer depth.
    Buffered(usize),
}

/// At-least-once outbound event queue with crash durability.
///
/// Events always go through the in-order buffer, so a new event can never
/// overtake one that is still waiting. While the control plane is
/// unreachable the buffer is mirrored to a JSON-lines file; a restarted
/// process reloads it and resumes where it left off.
pub struct EventQueue {
    control: Arc<dyn ControlPlane>,
    buffer_path: PathBuf,
    pending: Mutex<VecDeque<SignedEvent>>,
}

impl EventQueue {
    /// Open a queue, recovering any events a previous process left behind
    pub fn open(control: Arc<dyn ControlPlane>, buffer_path: impl Into<PathBuf>) -> Self {
        let buffer_path = buffer_path.into();
        let pending = load_buffer(&buffer_path);
        if !pending.is_empty() {
            info!(
                count = pending.len(),
                path = %buffer_path.display(),
                "Recovered buffered events from durability file"
            );
        }
        Self {
            control,
            buffer_path,
            pending: Mutex::new(pending),
        }
    }

    /// Enqueue and attempt delivery of this event plus any backlog
    pub async fn publish(&self, event: SignedEvent) -> RegistryResult<PublishOutcome> {
        let mut pending = self.pending.lock().await;
        pending.push_back(event);
        self.drain(&mut pending).await?;
        if pending.is_empty() {
            Ok(PublishOutcome::Delivered)
        } else {
            Ok(PublishOutcome::Buffered(pending.len()))
        }
    }

    /// Retry the backlog, e.g. after a reconnect signal. Returns how many
    /// events were delivered.
    pub async fn flush(&self) -> RegistryResult<usize> {
        let mut pending = self.pending.lock().await;
        self.drain(&mut pending).await
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Deliver from the front until the buffer empties or the control plane
    /// becomes unreachable. A rejection drops the event (retrying an event
    /// the control plane refused cannot succeed) and propagates.
    async fn drain(&self, pending: &mut VecDeque<SignedEvent>) -> RegistryResult<usize> {
        let mut delivered = 0;
        while let Some(event) = pending.front() {
            match self.control.publish(event).await {
                Ok(()) => {
                    pending.pop_front();
                    delivered += 1;
                }
                Err(RegistryError::Unreachable(reason)) => {
                    warn!(
                        reason,
                        buffered = pending.len(),
                        "Control plane unreachable, buffering events"
                    );
                    self.persist(pending)?;
                    return Ok(delivered);
                }
                Err(e) => {
                    let dropped = pending.pop_front();
                    if let Some(dropped) = dropped {
                        warn!(event_id = %dropped.id, error = %e, "Event rejected, dropping");
                    }
                    self.persist(pending)?;
                    return Err(e);
                }
            }
        }
        self.persist(pending)?;
        Ok(delivered)
    }

    fn persist(&self, pending: &VecDeque<SignedEvent>) -> RegistryResult<()> {
        if pending.is_empty() {
            if self.buffer_path.exists() {
                fs::remove_file(&self.buffer_path)?;
            }
            return Ok(());
        }
        let mut file = fs::File::create(&self.buffer_path)?;
        for event in pending {
            serde_json::to_writer(&mut file, event)?;
            file.write_all(b"\n")?;
        }
        Ok(())
    }
}

fn load_buffer(path: &Path) -> VecDeque<SignedEvent> {
    let Ok(contents) = fs::read_to_string(path) else {
        return VecDeque::new();
    };
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Skipping corrupt buffered event line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSigner;
    use crate::keys::ShopKeys;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    fn events(n: usize) -> Vec<SignedEvent> {
        let mut signer = EventSigner::new(ShopKeys::derive(Uuid::new_v4()));
        (0..n).map(|i| signer.sign(json!({"delta": i})).unwrap()).collect()
    }

    fn buffer_file(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("dan-events.jsonl")
    }

    #[tokio::test]
    async fn test_reachable_control_plane_delivers_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut control = MockControlPlane::new();
        control.expect_publish().times(1).returning(|_| Ok(()));

        let queue = EventQueue::open(Arc::new(control), buffer_file(&dir));
        let outcome = queue.publish(events(1).remove(0)).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Delivered);
        assert_eq!(queue.pending_len().await, 0);
        assert!(!buffer_file(&dir).exists());
    }

    #[tokio::test]
    async fn test_unreachable_control_plane_buffers_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut control = MockControlPlane::new();
        control
            .expect_publish()
            .times(2)
            .returning(|_| Err(RegistryError::Unreachable("down".to_string())));

        let queue = EventQueue::open(Arc::new(control), buffer_file(&dir));
        let mut evs = events(2);
        assert_eq!(
            queue.publish(evs.remove(0)).await.unwrap(),
            PublishOutcome::Buffered(1)
        );
        assert_eq!(
            queue.publish(evs.remove(0)).await.unwrap(),
            PublishOutcome::Buffered(2)
        );

        let contents = fs::read_to_string(buffer_file(&dir)).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_flush_preserves_order_and_empties_file() {
        let dir = tempfile::tempdir().unwrap();
        let evs = events(3);
        let expected_order: Vec<Uuid> = evs.iter().map(|e| e.id).collect();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut control = MockControlPlane::new();
        // First three attempts fail, then everything is accepted
        control
            .expect_publish()
            .times(3)
            .returning(|_| Err(RegistryError::Unreachable("down".to_string())));
        let seen_clone = Arc::clone(&seen);
        control.expect_publish().returning(move |event| {
            seen_clone.lock().unwrap().push(event.id);
            Ok(())
        });

        let queue = EventQueue::open(Arc::new(control), buffer_file(&dir));
        for event in evs {
            queue.publish(event).await.unwrap();
        }
        assert_eq!(queue.pending_len().await, 3);

        let delivered = queue.flush().await.unwrap();
        assert_eq!(delivered, 3);
        assert_eq!(*seen.lock().unwrap(), expected_order);
        assert_eq!(queue.pending_len().await, 0);
        assert!(!buffer_file(&dir).exists());
    }

    #[tokio::test]
    async fn test_new_event_does_not_overtake_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let evs = events(2);
        let first_id = evs[0].id;

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut control = MockControlPlane::new();
        control
            .expect_publish()
            .times(1)
            .returning(|_| Err(RegistryError::Unreachable("down".to_string())));
        let seen_clone = Arc::clone(&seen);
        control.expect_publish().returning(move |event| {
            seen_clone.lock().unwrap().push(event.id);
            Ok(())
        });

        let queue = EventQueue::open(Arc::new(control), buffer_file(&dir));
        let mut evs = evs.into_iter();
        queue.publish(evs.next().unwrap()).await.unwrap();
        // Second publish must deliver the buffered first event first
        queue.publish(evs.next().unwrap()).await.unwrap();

        assert_eq!(seen.lock().unwrap().first(), Some(&first_id));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_restart_recovers_buffered_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = buffer_file(&dir);

        {
            let mut control = MockControlPlane::new();
            control
                .expect_publish()
                .returning(|_| Err(RegistryError::Unreachable("down".to_string())));
            let queue = EventQueue::open(Arc::new(control), &path);
            for event in events(2) {
                queue.publish(event).await.unwrap();
            }
        }

        let mut control = MockControlPlane::new();
        control.expect_publish().times(2).returning(|_| Ok(()));
        let queue = EventQueue::open(Arc::new(control), &path);
        assert_eq!(queue.pending_len().await, 2);
        assert_eq!(queue.flush().await.unwrap(), 2);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rejected_event_is_dropped_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut control = MockControlPlane::new();
        control
            .expect_publish()
            .times(1)
            .returning(|_| Err(RegistryError::Rejected("bad signature".to_string())));

        let queue = EventQueue::open(Arc::new(control), buffer_file(&dir));
        let result = queue.publish(events(1).remove(0)).await;
        assert!(matches!(result, Err(RegistryError::Rejected(_))));
        assert_eq!(queue.pending_len().await, 0);
    }
}
