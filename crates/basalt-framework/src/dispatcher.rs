//! Interaction dispatcher.
//!
//! The [`Dispatcher`] takes raw inbound interactions and drives each command
//! invocation through its life:
//!
//! ```text
//! Received ──► Resolved ──► Piped ──► Succeeded     commandSuccess, cooldown started
//!    │            │           ├─────► Rejected      gate event, run never called
//!    │            │           ├─────► Errored       commandError
//!    │            │           └─────► ShortCircuited (a middleware did not call next)
//!    │            └─► Unknown       (name not registered, trace log only)
//!    └─► Ignored                    (not a command interaction)
//! ```
//!
//! Every interaction, command or not, is first published to the
//! [`InteractionHub`] so collectors can see button presses.
//!
//! Handler failures never escape [`dispatch`](Dispatcher::dispatch): errors
//! and panics from a command or a middleware become a `commandError` event.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tower::BoxError;
use tower::util::BoxCloneSyncService;
use tracing::{Instrument, debug, debug_span, info, trace};

use crate::collector::InteractionHub;
use crate::context::{ContextServices, InvocationContext, Settled};
use crate::cooldown::CooldownTracker;
use crate::error::{FrameworkResult, HandlerError, NotFoundError};
use crate::event::{EventBus, LifecycleEvent};
use crate::gate::{self, Gates, Rejection};
use crate::localization::{BoxedStringTable, Localizer};
use crate::owners::OwnerSet;
use crate::pipeline::{Middleware, MiddlewareId, Pipeline};
use crate::registry::CommandRegistry;
use basalt_core::{BitfieldPermissionChecker, BoxedGateway, Interaction, PermissionChecker};

/// Where an interaction ended up.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Not a command interaction.
    Ignored,
    /// No command with that name is registered.
    Unknown,
    /// A middleware returned without calling `next`.
    ShortCircuited,
    /// A gate stopped the invocation.
    Rejected(Rejection),
    /// The command ran and returned `Ok`.
    Succeeded,
    /// The command or a middleware failed.
    Errored(Arc<HandlerError>),
}

/// State read by the terminal stage.
struct Shared {
    commands: Arc<CommandRegistry>,
    cooldowns: Arc<CooldownTracker>,
    owners: Arc<OwnerSet>,
    permissions: Arc<dyn PermissionChecker>,
    events: Arc<EventBus>,
}

impl Shared {
    /// Gates, then `run`, then success bookkeeping.
    async fn terminal(&self, ctx: Arc<InvocationContext>) -> Result<(), BoxError> {
        let definition = ctx.definition();
        let gates = Gates {
            owners: &self.owners,
            cooldowns: &self.cooldowns,
            permissions: self.permissions.as_ref(),
        };

        if let Err(rejection) = gate::evaluate(definition, ctx.interaction(), gates) {
            debug!(reason = %rejection, "Invocation rejected");
            ctx.settle(Settled::Rejected(rejection.clone()));
            self.events
                .emit(LifecycleEvent::rejected(Arc::clone(&ctx), rejection));
            return Ok(());
        }

        ctx.command().run(Arc::clone(&ctx)).await?;

        ctx.settle(Settled::Ran);
        self.events.emit(LifecycleEvent::CommandSuccess {
            ctx: Arc::clone(&ctx),
        });
        self.cooldowns
            .start(&definition.name, ctx.interaction().user.id, definition.cooldown);
        Ok(())
    }
}

/// Routes interactions to commands.
///
/// Cheap to clone; clones share every registry and the middleware list.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    pipeline: Pipeline,
    services: ContextServices,
}

impl Dispatcher {
    /// Starts building a dispatcher over `commands` that answers through
    /// `gateway`.
    pub fn builder(commands: Arc<CommandRegistry>, gateway: BoxedGateway) -> DispatcherBuilder {
        DispatcherBuilder {
            commands,
            gateway,
            strings: Arc::new(Localizer::default()),
            owners: Arc::new(OwnerSet::new()),
            cooldowns: Arc::new(CooldownTracker::new()),
            permissions: Arc::new(BitfieldPermissionChecker),
            events: Arc::new(EventBus::default()),
            hub: InteractionHub::default(),
        }
    }

    /// Handles one inbound interaction.
    pub async fn dispatch(&self, interaction: Interaction) -> DispatchOutcome {
        self.services.hub.publish(&interaction);

        let interaction = match interaction {
            Interaction::Command(interaction) => interaction,
            other => {
                trace!(kind = other.kind(), "Ignoring non-command interaction");
                return DispatchOutcome::Ignored;
            }
        };

        let Some(command) = self.shared.commands.get(&interaction.command_name) else {
            trace!(command = %interaction.command_name, "Unknown command");
            return DispatchOutcome::Unknown;
        };

        let ctx = Arc::new(InvocationContext::new(
            command,
            interaction,
            self.services.clone(),
        ));
        let span = debug_span!(
            "invocation",
            command = %ctx.command_name(),
            user = %ctx.user().id,
            interaction = %ctx.interaction().id,
        );
        self.invoke(ctx).instrument(span).await
    }

    async fn invoke(&self, ctx: Arc<InvocationContext>) -> DispatchOutcome {
        let result = match AssertUnwindSafe(self.pipeline.run(Arc::clone(&ctx)))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(panic_error(panic)),
        };

        match result {
            Ok(()) => match ctx.settled() {
                Some(Settled::Ran) => {
                    debug!("Command succeeded");
                    DispatchOutcome::Succeeded
                }
                Some(Settled::Rejected(rejection)) => DispatchOutcome::Rejected(rejection),
                None => {
                    debug!("Middleware stopped the invocation");
                    DispatchOutcome::ShortCircuited
                }
            },
            Err(source) => {
                let error = Arc::new(HandlerError::new(ctx.command_name(), source));
                debug!(error = %error, "Command failed");
                self.shared.events.emit(LifecycleEvent::CommandError {
                    ctx: Arc::clone(&ctx),
                    error: Arc::clone(&error),
                });
                DispatchOutcome::Errored(error)
            }
        }
    }

    // ─── Command sync ─────────────────────────────────────────────────────────

    /// Replaces the platform's command list with every registered command.
    ///
    /// Returns how many commands were sent.
    pub async fn update_commands(&self) -> FrameworkResult<usize> {
        let commands = self.shared.commands.json();
        let count = commands.len();
        self.services.gateway.bulk_update_commands(commands).await?;
        info!(count, "Synchronised application commands");
        Ok(count)
    }

    /// Pushes a single command to the platform.
    pub async fn update_command(&self, name: &str) -> FrameworkResult<()> {
        let command = self
            .shared
            .commands
            .get(name)
            .ok_or_else(|| NotFoundError::command(name))?;
        self.services.gateway.upsert_command(command.json()).await?;
        debug!(command = %name, "Synchronised application command");
        Ok(())
    }

    // ─── Middleware ───────────────────────────────────────────────────────────

    pub fn add_middleware<M: Middleware>(&self, middleware: M) -> MiddlewareId {
        self.pipeline.add_middleware(middleware)
    }

    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        self.pipeline.remove_middleware(id)
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.shared.commands
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.shared.cooldowns
    }

    pub fn owners(&self) -> &Arc<OwnerSet> {
        &self.shared.owners
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn hub(&self) -> &InteractionHub {
        &self.services.hub
    }

    pub fn gateway(&self) -> &BoxedGateway {
        &self.services.gateway
    }

    pub fn strings(&self) -> &BoxedStringTable {
        &self.services.strings
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> BoxError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("command panicked: {message}").into()
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    commands: Arc<CommandRegistry>,
    gateway: BoxedGateway,
    strings: BoxedStringTable,
    owners: Arc<OwnerSet>,
    cooldowns: Arc<CooldownTracker>,
    permissions: Arc<dyn PermissionChecker>,
    events: Arc<EventBus>,
    hub: InteractionHub,
}

impl DispatcherBuilder {
    pub fn strings(mut self, strings: BoxedStringTable) -> Self {
        self.strings = strings;
        self
    }

    pub fn owners(mut self, owners: Arc<OwnerSet>) -> Self {
        self.owners = owners;
        self
    }

    pub fn cooldowns(mut self, cooldowns: Arc<CooldownTracker>) -> Self {
        self.cooldowns = cooldowns;
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn hub(mut self, hub: InteractionHub) -> Self {
        self.hub = hub;
        self
    }

    pub fn build(self) -> Dispatcher {
        let shared = Arc::new(Shared {
            commands: self.commands,
            cooldowns: self.cooldowns,
            owners: self.owners,
            permissions: self.permissions,
            events: self.events,
        });

        let terminal_state = Arc::clone(&shared);
        let terminal = BoxCloneSyncService::new(tower::service_fn(
            move |ctx: Arc<InvocationContext>| {
                let shared = Arc::clone(&terminal_state);
                async move { shared.terminal(ctx).await }
            },
        ));

        Dispatcher {
            shared,
            pipeline: Pipeline::new(terminal),
            services: ContextServices {
                gateway: self.gateway,
                strings: self.strings,
                hub: self.hub,
            },
        }
    }
}
