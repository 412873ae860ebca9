//! Notify bus implementations.
//!
//! The bus is a performance optimization over polling, never a source of
//! truth. Every decision it influences must be re-derivable from the task
//! store alone (the poller exists precisely so that remains true). This
//! crate ships two substrates: [`PgNotifyBus`], backed by Postgres
//! LISTEN/NOTIFY for multi-process deployments, and [`LocalNotifyBus`], an
//! in-process channel for single-binary deployments that don't need
//! cross-process fanout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use torque_core::{NotifyBus, Result};
use uuid::Uuid;

pub const TASK_NOTIFY_CHANNEL: &str = "torque_task_ready";

/// Postgres LISTEN/NOTIFY-backed bus. A background task holds the LISTEN
/// connection and reconnects with a backoff if it drops; callers of
/// `consume` never see that churn, only an occasional gap in delivery, which
/// is exactly the "loss acceptable" contract the bus promises.
pub struct PgNotifyBus {
    pool: PgPool,
    receiver: Mutex<UnboundedReceiver<Uuid>>,
}

impl PgNotifyBus {
    /// Connects the background LISTEN loop immediately so `consume` has
    /// something to read from as soon as the bus is constructed.
    pub fn new(pool: PgPool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_listen_loop(pool.clone(), tx);
        Self {
            pool,
            receiver: Mutex::new(rx),
        }
    }
}

fn spawn_listen_loop(pool: PgPool, tx: UnboundedSender<Uuid>) {
    tokio::spawn(async move {
        loop {
            match PgListener::connect_with(&pool).await {
                Ok(mut listener) => {
                    if let Err(err) = listener.listen(TASK_NOTIFY_CHANNEL).await {
                        tracing::warn!(error = %err, "notify bus LISTEN failed, retrying");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                    loop {
                        match listener.recv().await {
                            Ok(notification) => {
                                if let Ok(id) = notification.payload().parse::<Uuid>() {
                                    // An unbounded send only fails once every
                                    // receiver has dropped; nothing to do but
                                    // let the notification fall on the floor.
                                    let _ = tx.send(id);
                                } else {
                                    tracing::warn!(
                                        payload = notification.payload(),
                                        "dropping malformed notify payload"
                                    );
                                }
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "notify bus connection lost, reconnecting");
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "notify bus connect failed, retrying");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });
}

#[async_trait]
impl NotifyBus for PgNotifyBus {
    async fn publish(&self, id: Uuid) -> Result<()> {
        // `pg_notify` rather than a literal `NOTIFY channel, 'payload'` so
        // the payload can be bound instead of interpolated.
        if let Err(err) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(TASK_NOTIFY_CHANNEL)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
        {
            // Publication is an optimization; a failure here degrades to
            // polling, it never fails the caller's dispatch/enqueue.
            tracing::warn!(error = %err, task_id = %id, "notify bus publish failed, relying on poller");
        }
        Ok(())
    }

    async fn consume(&self) -> Result<Option<Uuid>> {
        Ok(self.receiver.lock().await.recv().await)
    }
}

/// In-process bus for single-binary deployments: an unbounded mpsc channel
/// shared by every handle cloned from the same `Arc`. Useful for a small
/// Torque deployment that runs ingress, workers and poller in one process
/// and has no other consumer of Postgres's LISTEN/NOTIFY channel.
pub struct LocalNotifyBus {
    sender: UnboundedSender<Uuid>,
    receiver: Mutex<UnboundedReceiver<Uuid>>,
}

impl Default for LocalNotifyBus {
    fn default() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl LocalNotifyBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl NotifyBus for LocalNotifyBus {
    async fn publish(&self, id: Uuid) -> Result<()> {
        let _ = self.sender.send(id);
        Ok(())
    }

    async fn consume(&self) -> Result<Option<Uuid>> {
        Ok(self.receiver.lock().await.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_bus_delivers_published_ids_in_order() {
        let bus = LocalNotifyBus::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        bus.publish(a).await.unwrap();
        bus.publish(b).await.unwrap();

        assert_eq!(bus.consume().await.unwrap(), Some(a));
        assert_eq!(bus.consume().await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn local_bus_is_shared_across_clones_of_the_arc() {
        let bus = LocalNotifyBus::new();
        let producer = bus.clone();
        let id = Uuid::new_v4();
        producer.publish(id).await.unwrap();
        assert_eq!(bus.consume().await.unwrap(), Some(id));
    }
}
