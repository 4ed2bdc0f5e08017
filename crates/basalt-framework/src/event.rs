//! Lifecycle events emitted by the dispatcher.
//!
//! Every invocation that reaches the pipeline ends in at most one gate
//! event, or in `commandSuccess` and/or `commandError`. Listeners registered
//! with [`EventBus::on`] run synchronously, in registration order, before the
//! dispatcher moves on; [`EventBus::subscribe`] hands out an async stream of
//! the same events for consumers that would rather not block dispatch.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::context::InvocationContext;
use crate::error::HandlerError;
use crate::gate::Rejection;
use basalt_core::Permission;

const DEFAULT_CAPACITY: usize = 128;

/// Discriminant of a [`LifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoPermissions,
    CommandCooldown,
    OwnerOnlyCommand,
    GuildOnlyCommand,
    CommandSuccess,
    CommandError,
}

impl EventKind {
    /// The event's conventional name, e.g. `commandCooldown`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoPermissions => "noPermissions",
            Self::CommandCooldown => "commandCooldown",
            Self::OwnerOnlyCommand => "ownerOnlyCommand",
            Self::GuildOnlyCommand => "guildOnlyCommand",
            Self::CommandSuccess => "commandSuccess",
            Self::CommandError => "commandError",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event in the life of an invocation.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The invoking member lacks some of the required permissions.
    NoPermissions {
        ctx: Arc<InvocationContext>,
        missing: BTreeSet<Permission>,
    },
    /// The invoker is on cooldown.
    CommandCooldown {
        ctx: Arc<InvocationContext>,
        seconds_left: u64,
    },
    /// An owner-only command was invoked by someone else.
    OwnerOnlyCommand { ctx: Arc<InvocationContext> },
    /// A guild-only command was invoked outside a guild.
    GuildOnlyCommand { ctx: Arc<InvocationContext> },
    /// The command's `run` returned `Ok`.
    CommandSuccess { ctx: Arc<InvocationContext> },
    /// The command or a middleware failed.
    CommandError {
        ctx: Arc<InvocationContext>,
        error: Arc<HandlerError>,
    },
}

impl LifecycleEvent {
    /// The gate event matching `rejection`.
    pub fn rejected(ctx: Arc<InvocationContext>, rejection: Rejection) -> Self {
        match rejection {
            Rejection::OwnerOnly => Self::OwnerOnlyCommand { ctx },
            Rejection::GuildOnly => Self::GuildOnlyCommand { ctx },
            Rejection::Cooldown { seconds_left } => Self::CommandCooldown { ctx, seconds_left },
            Rejection::MissingPermissions(missing) => Self::NoPermissions { ctx, missing },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::NoPermissions { .. } => EventKind::NoPermissions,
            Self::CommandCooldown { .. } => EventKind::CommandCooldown,
            Self::OwnerOnlyCommand { .. } => EventKind::OwnerOnlyCommand,
            Self::GuildOnlyCommand { .. } => EventKind::GuildOnlyCommand,
            Self::CommandSuccess { .. } => EventKind::CommandSuccess,
            Self::CommandError { .. } => EventKind::CommandError,
        }
    }

    /// The invocation the event belongs to.
    pub fn context(&self) -> &Arc<InvocationContext> {
        match self {
            Self::NoPermissions { ctx, .. }
            | Self::CommandCooldown { ctx, .. }
            | Self::OwnerOnlyCommand { ctx }
            | Self::GuildOnlyCommand { ctx }
            | Self::CommandSuccess { ctx }
            | Self::CommandError { ctx, .. } => ctx,
        }
    }
}

/// Handle returned by [`EventBus::on`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    kind: Option<EventKind>,
    listener: Listener,
}

/// Publish/subscribe hub for [`LifecycleEvent`]s.
pub struct EventBus {
    listeners: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<LifecycleEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            sender,
        }
    }

    fn register(&self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Registration { id, kind, listener });
        id
    }

    /// Registers a listener for every event.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    /// Registers a listener for one kind of event.
    pub fn on_kind<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(listener))
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    /// Receives every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Delivers `event` to matching listeners, then to subscribers.
    pub fn emit(&self, event: LifecycleEvent) {
        let kind = event.kind();
        let matching: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|r| r.kind.is_none_or(|k| k == kind))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in matching {
            listener(&event);
        }
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::collector::InteractionHub;
    use crate::command::{BoxedCommand, CommandDefinition, FnCommand};
    use crate::context::ContextServices;
    use crate::context::tests::{RecordingGateway, interaction};
    use crate::localization::Localizer;

    fn ctx() -> Arc<InvocationContext> {
        let command: BoxedCommand = Arc::new(FnCommand::new(
            CommandDefinition::new("ping", "Pong"),
            |_ctx| async { Ok(()) },
        ));
        Arc::new(InvocationContext::new(
            command,
            interaction("ping", 1, None),
            ContextServices {
                gateway: Arc::new(RecordingGateway::default()),
                strings: Arc::new(Localizer::default()),
                hub: InteractionHub::default(),
            },
        ))
    }

    #[test]
    fn test_rejection_mapping() {
        let event = LifecycleEvent::rejected(ctx(), Rejection::Cooldown { seconds_left: 3 });
        assert_eq!(event.kind(), EventKind::CommandCooldown);
        assert!(matches!(
            event,
            LifecycleEvent::CommandCooldown { seconds_left: 3, .. }
        ));
        assert_eq!(EventKind::NoPermissions.to_string(), "noPermissions");
    }

    #[test]
    fn test_listeners_filter_and_off() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let all = {
            let seen = Arc::clone(&seen);
            bus.on(move |e| seen.lock().push(format!("all:{}", e.kind())))
        };
        {
            let seen = Arc::clone(&seen);
            bus.on_kind(EventKind::CommandSuccess, move |e| {
                seen.lock().push(format!("success:{}", e.context().command_name()))
            });
        }

        bus.emit(LifecycleEvent::OwnerOnlyCommand { ctx: ctx() });
        bus.emit(LifecycleEvent::CommandSuccess { ctx: ctx() });
        assert!(bus.off(all));
        assert!(!bus.off(all));
        bus.emit(LifecycleEvent::CommandSuccess { ctx: ctx() });

        assert_eq!(
            *seen.lock(),
            [
                "all:ownerOnlyCommand",
                "all:commandSuccess",
                "success:ping",
                "success:ping"
            ]
        );
    }

    #[tokio::test]
    async fn test_subscribe() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(LifecycleEvent::GuildOnlyCommand { ctx: ctx() });
        assert_eq!(rx.recv().await.unwrap().kind(), EventKind::GuildOnlyCommand);
    }
}
