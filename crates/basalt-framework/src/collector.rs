//! Component interaction collectors.
//!
//! The dispatcher publishes every inbound interaction to an
//! [`InteractionHub`]. Collectors subscribe to it to wait for button presses
//! on a message they sent. A subscription is a broadcast receiver, so
//! dropping the collector (on match, timeout or `stop`) is all it takes to
//! unsubscribe.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::warn;

use basalt_core::{ComponentInteraction, Interaction, MessageId};

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of inbound interactions to collectors.
#[derive(Debug, Clone)]
pub struct InteractionHub {
    sender: broadcast::Sender<Interaction>,
}

impl Default for InteractionHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InteractionHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Delivers `interaction` to every current subscriber and returns how
    /// many there were.
    pub fn publish(&self, interaction: &Interaction) -> usize {
        self.sender.send(interaction.clone()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Interaction> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Predicate over component interactions.
pub type ComponentFilter = Arc<dyn Fn(&ComponentInteraction) -> bool + Send + Sync>;

async fn recv_matching(
    receiver: &mut broadcast::Receiver<Interaction>,
    message_id: MessageId,
    filter: &(dyn Fn(&ComponentInteraction) -> bool + Send + Sync),
) -> Option<ComponentInteraction> {
    loop {
        match receiver.recv().await {
            Ok(Interaction::Component(component))
                if component.message_id == message_id && filter(&component) =>
            {
                return Some(component);
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Collector fell behind, interactions were dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Waits for one component interaction on `message_id` that passes
/// `filter`, giving up after `time`.
pub async fn await_component<F>(
    hub: &InteractionHub,
    message_id: MessageId,
    filter: F,
    time: Duration,
) -> Option<ComponentInteraction>
where
    F: Fn(&ComponentInteraction) -> bool + Send + Sync,
{
    let mut receiver = hub.subscribe();
    timeout(time, recv_matching(&mut receiver, message_id, &filter))
        .await
        .ok()
        .flatten()
}

/// Streams component interactions on one message until stopped or its time
/// limit passes.
///
/// ```rust,ignore
/// let mut collector = InteractionCollector::new(ctx.hub(), message_id, Duration::from_secs(30), |c| {
///     c.custom_id.starts_with("page:")
/// });
/// while let Some(press) = collector.next().await {
///     // ...
/// }
/// ```
pub struct InteractionCollector {
    receiver: Option<broadcast::Receiver<Interaction>>,
    message_id: MessageId,
    filter: ComponentFilter,
    deadline: Instant,
}

impl InteractionCollector {
    pub fn new<F>(hub: &InteractionHub, message_id: MessageId, time: Duration, filter: F) -> Self
    where
        F: Fn(&ComponentInteraction) -> bool + Send + Sync + 'static,
    {
        Self {
            receiver: Some(hub.subscribe()),
            message_id,
            filter: Arc::new(filter),
            deadline: Instant::now() + time,
        }
    }

    /// Waits for the next matching interaction.
    ///
    /// Returns `None` once the collector is stopped or has timed out; it
    /// stays stopped afterwards.
    pub async fn next(&mut self) -> Option<ComponentInteraction> {
        let Self {
            receiver,
            message_id,
            filter,
            deadline,
        } = self;
        let rx = receiver.as_mut()?;

        let collected = timeout_at(*deadline, recv_matching(rx, *message_id, &**filter))
            .await
            .ok()
            .flatten();
        if collected.is_none() {
            *receiver = None;
        }
        collected
    }

    /// Unsubscribes immediately.
    pub fn stop(&mut self) {
        self.receiver = None;
    }

    pub fn is_stopped(&self) -> bool {
        self.receiver.is_none()
    }

    /// Turns the collector into a stream of matching interactions.
    pub fn into_stream(self) -> impl Stream<Item = ComponentInteraction> + Send {
        futures::stream::unfold(self, |mut collector| async move {
            collector.next().await.map(|item| (item, collector))
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use basalt_core::{InteractionId, User};

    fn press(message: u64, custom_id: &str, user: u64) -> Interaction {
        Interaction::Component(ComponentInteraction {
            id: InteractionId::new(99),
            token: "tok".into(),
            custom_id: custom_id.into(),
            message_id: MessageId::new(message),
            user: User::new(user, "clicker"),
            guild_id: None,
        })
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = InteractionHub::default();
        assert_eq!(hub.publish(&Interaction::Ping), 0);
    }

    #[tokio::test]
    async fn test_await_component_matches() {
        let hub = InteractionHub::default();
        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let wanted = |c: &ComponentInteraction| c.custom_id == "yes";
                await_component(&hub, MessageId::new(5), wanted, Duration::from_secs(10)).await
            })
        };
        while hub.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }

        hub.publish(&press(4, "yes", 1));
        hub.publish(&press(5, "no", 1));
        hub.publish(&press(5, "yes", 1));

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.custom_id, "yes");
        assert_eq!(got.message_id, MessageId::new(5));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_component_timeout_unsubscribes() {
        let hub = InteractionHub::default();
        let got = await_component(&hub, MessageId::new(5), |_| true, Duration::from_secs(1)).await;
        assert!(got.is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_until_deadline() {
        let hub = InteractionHub::default();
        let mut collector =
            InteractionCollector::new(&hub, MessageId::new(7), Duration::from_secs(5), |_| true);

        hub.publish(&press(7, "a", 1));
        hub.publish(&press(8, "b", 1));
        hub.publish(&press(7, "c", 2));

        assert_eq!(collector.next().await.unwrap().custom_id, "a");
        assert_eq!(collector.next().await.unwrap().custom_id, "c");
        assert!(collector.next().await.is_none());
        assert!(collector.is_stopped());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_collector_stop() {
        let hub = InteractionHub::default();
        let mut collector =
            InteractionCollector::new(&hub, MessageId::new(7), Duration::from_secs(60), |_| true);
        assert_eq!(hub.subscriber_count(), 1);

        collector.stop();
        assert_eq!(hub.subscriber_count(), 0);
        hub.publish(&press(7, "a", 1));
        assert!(collector.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_stream() {
        let hub = InteractionHub::default();
        let collector =
            InteractionCollector::new(&hub, MessageId::new(7), Duration::from_secs(5), |c| {
                c.user.id.get() == 1
            });
        hub.publish(&press(7, "a", 1));
        hub.publish(&press(7, "b", 2));
        hub.publish(&press(7, "c", 1));

        let ids: Vec<String> = collector
            .into_stream()
            .map(|c| c.custom_id)
            .collect()
            .await;
        assert_eq!(ids, ["a", "c"]);
    }
}
