//! Runtime orchestration.
//!
//! The runtime owns the registries and the dispatcher, loads module
//! directories on start, and pumps interactions from the gateway into the
//! dispatcher until it is told to stop.
//!
//! ```rust,ignore
//! let (tx, rx) = basalt_core::interaction_channel(256);
//! let runtime = BasaltRuntime::builder()
//!     .config_file("basalt.toml")
//!     .gateway(MyGateway::connect(tx).await?)
//!     .build()?;
//!
//! runtime.run(rx).await?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::config::{BasaltConfig, ConfigLoader, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use basalt_core::{
    BitfieldPermissionChecker, BoxedGateway, Gateway, InteractionReceiver, PermissionChecker,
};
use basalt_framework::{
    BoxedLoader, ClientLocale, CommandRegistry, Dispatcher, EventKind, ExtensionRegistry,
    FrameworkError, FrameworkResult, LanguageMiddleware, LanguageProvider, LifecycleEvent,
    Localizer, ManifestLoader, OwnerSet,
};

type InstallLanguage = Box<dyn FnOnce(&Dispatcher) + Send>;

/// The Basalt runtime.
pub struct BasaltRuntime {
    config: BasaltConfig,
    dispatcher: Dispatcher,
    extensions: Arc<ExtensionRegistry>,
    localizer: Arc<Localizer>,
    shutdown: CancellationToken,
}

impl BasaltRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &BasaltConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn commands(&self) -> &Arc<CommandRegistry> {
        self.dispatcher.commands()
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    pub fn localizer(&self) -> &Arc<Localizer> {
        &self.localizer
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Asks a running runtime to stop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Loads the extension directory, then the command directory.
    ///
    /// A directory that does not exist is skipped with a warning.
    pub async fn start(&self) -> RuntimeResult<()> {
        let extensions = skip_missing(
            &self.config.extensions.dir,
            self.extensions.load_all(&self.config.extensions.dir).await,
        )?;
        let commands = skip_missing(
            &self.config.commands.dir,
            self.commands().load_all(&self.config.commands.dir).await,
        )?;
        info!(extensions, commands, "Runtime started");
        Ok(())
    }

    /// Runs once the gateway is connected.
    ///
    /// Fetches the application owners when none are configured, then pushes
    /// the command list if `commands.sync_on_ready` is set.
    pub async fn on_ready(&self) -> RuntimeResult<()> {
        let owners = self.dispatcher.owners();
        if owners.is_empty() {
            match self.dispatcher.gateway().fetch_application_owners().await {
                Ok(fetched) => {
                    info!(count = fetched.len(), "Fetched application owners");
                    owners.replace(fetched);
                }
                Err(e) => error!(error = %e, "Failed to fetch application owners"),
            }
        }

        if self.config.commands.sync_on_ready {
            self.dispatcher.update_commands().await?;
        }
        Ok(())
    }

    /// Starts, then dispatches interactions until the channel closes, the
    /// shutdown token is cancelled, or the process receives Ctrl+C / SIGTERM.
    ///
    /// Every interaction is handled on its own task. On the way out the
    /// runtime waits for in-flight invocations, then runs every extension's
    /// `on_exit` hook.
    pub async fn run(&self, mut interactions: InteractionReceiver) -> RuntimeResult<()> {
        self.start().await?;
        self.on_ready().await?;

        let signal = shutdown_signal()?;
        tokio::pin!(signal);
        let sweeper = self.spawn_sweeper();
        let tasks = TaskTracker::new();

        info!("Basalt runtime is now running. Press Ctrl+C to stop.");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = &mut signal => break,
                received = interactions.recv() => match received {
                    Some(interaction) => {
                        let dispatcher = self.dispatcher.clone();
                        tasks.spawn(async move {
                            dispatcher.dispatch(interaction).await;
                        });
                    }
                    None => {
                        info!("Interaction channel closed");
                        break;
                    }
                },
            }
        }

        self.shutdown.cancel();
        tasks.close();
        debug!(in_flight = tasks.len(), "Waiting for in-flight invocations");
        tasks.wait().await;
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        self.extensions.exit_all().await;
        info!("Runtime stopped");
        Ok(())
    }

    /// Drops expired cooldown entries every `cooldowns.sweep_interval_secs`.
    fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let secs = self.config.cooldowns.sweep_interval_secs;
        if secs == 0 {
            return None;
        }

        let cooldowns = Arc::clone(self.dispatcher.cooldowns());
        let token = self.shutdown.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cooldowns.sweep();
                        if removed > 0 {
                            trace!(removed, "Swept expired cooldowns");
                        }
                    }
                }
            }
        }))
    }
}

fn skip_missing(dir: &Path, result: FrameworkResult<usize>) -> RuntimeResult<usize> {
    match result {
        Ok(count) => Ok(count),
        Err(FrameworkError::Directory { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            warn!(dir = %dir.display(), "Module directory not found, skipping");
            Ok(0)
        }
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "Failed to load modules");
            Err(e.into())
        }
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
fn shutdown_signal() -> RuntimeResult<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(RuntimeError::Signal)?;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    Ok(async move {
        #[cfg(unix)]
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await;
            info!("Received Ctrl+C, shutting down");
        }
    })
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`BasaltRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<BasaltConfig>,
    gateway: Option<BoxedGateway>,
    loader: Option<BoxedLoader>,
    permissions: Arc<dyn PermissionChecker>,
    language: InstallLanguage,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            gateway: None,
            loader: None,
            permissions: Arc::new(BitfieldPermissionChecker),
            language: Box::new(|dispatcher: &Dispatcher| {
                dispatcher.add_middleware(LanguageMiddleware::new(ClientLocale));
            }),
            init_logging: true,
        }
    }

    /// Loads exactly this configuration file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Edits the configuration loader in place.
    pub fn configure(mut self, f: impl FnOnce(ConfigLoader) -> ConfigLoader) -> Self {
        self.config_loader = f(self.config_loader);
        self
    }

    /// Uses `config` as is; no files or environment variables are read.
    pub fn config(mut self, config: BasaltConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn gateway<G: Gateway + 'static>(mut self, gateway: G) -> Self {
        self.gateway = Some(Arc::new(gateway));
        self
    }

    pub fn shared_gateway(mut self, gateway: BoxedGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Module loader for both registries. Defaults to [`ManifestLoader`].
    pub fn loader(mut self, loader: BoxedLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn permissions(mut self, checker: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = checker;
        self
    }

    /// Replaces the default client-locale language resolution.
    pub fn language_provider<P: LanguageProvider>(mut self, provider: P) -> Self {
        self.language = Box::new(move |dispatcher: &Dispatcher| {
            dispatcher.add_middleware(LanguageMiddleware::new(provider));
        });
        self
    }

    /// Leave the global `tracing` subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn build(self) -> RuntimeResult<BasaltRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let gateway = self.gateway.ok_or(RuntimeError::MissingGateway)?;
        let loader: BoxedLoader = match self.loader {
            Some(loader) => loader,
            None => Arc::new(ManifestLoader::new()),
        };

        let mut localizer = Localizer::new(config.localization.default_language.clone());
        if let Some(dir) = &config.localization.languages_dir {
            localizer = localizer.with_dir(dir);
            if dir.is_dir() {
                localizer.load_languages()?;
            } else {
                warn!(dir = %dir.display(), "Language directory not found, skipping");
            }
        }
        let localizer = Arc::new(localizer);

        let commands = Arc::new(
            CommandRegistry::new(Arc::clone(&loader)).with_policy(config.commands.reload_policy),
        );
        let extensions = Arc::new(
            ExtensionRegistry::new(loader).with_policy(config.extensions.reload_policy),
        );
        let owners: OwnerSet = config.owners.iter().copied().collect();

        let dispatcher = Dispatcher::builder(commands, gateway)
            .strings(localizer.clone())
            .owners(Arc::new(owners))
            .permissions(self.permissions)
            .build();
        (self.language)(&dispatcher);
        dispatcher
            .events()
            .on_kind(EventKind::CommandError, log_command_error);

        info!(
            log_level = %config.logging.level,
            languages = localizer.languages().len(),
            "Runtime initialized from configuration"
        );

        Ok(BasaltRuntime {
            config,
            dispatcher,
            extensions,
            localizer,
            shutdown: CancellationToken::new(),
        })
    }
}

fn log_command_error(event: &LifecycleEvent) {
    if let LifecycleEvent::CommandError { ctx, error } = event {
        error!(
            command = %error.command,
            user = %ctx.user().id,
            error = %error.source,
            "Command failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use basalt_core::{
        ApiError, ApiResult, ApplicationCommand, CommandInteraction, Interaction,
        InteractionContent, InteractionId, InteractionResponse, User, UserId,
        interaction_channel,
    };
    use basalt_framework::{
        BoxError, BoxedCommand, BoxedExtension, CommandDefinition, Extension,
        ExtensionDefinition, FnCommand, MemoryLoader,
    };

    #[derive(Default)]
    struct StubGateway {
        replies: Mutex<Vec<String>>,
        synced: AtomicUsize,
        owners: Vec<UserId>,
        fail_owners: bool,
    }

    #[async_trait]
    impl Gateway for StubGateway {
        async fn create_interaction_response(
            &self,
            _interaction: &CommandInteraction,
            response: InteractionResponse,
        ) -> ApiResult<()> {
            if let InteractionResponse::ChannelMessage(content) = response {
                self.replies.lock().push(content.content.unwrap_or_default());
            }
            Ok(())
        }

        async fn edit_original_response(
            &self,
            _interaction: &CommandInteraction,
            _content: InteractionContent,
        ) -> ApiResult<()> {
            Ok(())
        }

        async fn create_followup(
            &self,
            _interaction: &CommandInteraction,
            _content: InteractionContent,
        ) -> ApiResult<()> {
            Ok(())
        }

        async fn delete_original_response(&self, _interaction: &CommandInteraction) -> ApiResult<()> {
            Ok(())
        }

        async fn bulk_update_commands(&self, commands: Vec<ApplicationCommand>) -> ApiResult<()> {
            self.synced.store(commands.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn upsert_command(&self, _command: ApplicationCommand) -> ApiResult<()> {
            Ok(())
        }

        async fn fetch_application_owners(&self) -> ApiResult<Vec<UserId>> {
            if self.fail_owners {
                return Err(ApiError::NotConnected);
            }
            Ok(self.owners.clone())
        }
    }

    struct CountingExtension {
        definition: ExtensionDefinition,
        exits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Extension for CountingExtension {
        fn definition(&self) -> &ExtensionDefinition {
            &self.definition
        }

        async fn on_exit(&self) -> Result<(), BoxError> {
            self.exits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> BasaltConfig {
        let mut config = BasaltConfig::default();
        config.localization.languages_dir = None;
        config.cooldowns.sweep_interval_secs = 1;
        config
    }

    fn loader(exits: &Arc<AtomicUsize>) -> Arc<MemoryLoader> {
        let loader = Arc::new(MemoryLoader::new());
        loader.insert_command("commands/ping", || {
            Ok(Arc::new(FnCommand::new(
                CommandDefinition::new("ping", "Pong").cooldown(5),
                |ctx| async move {
                    ctx.reply("pong").await?;
                    Ok::<(), BoxError>(())
                },
            )) as BoxedCommand)
        });
        let exits = Arc::clone(exits);
        loader.insert_extension("extensions/stats", move || {
            Ok(Arc::new(CountingExtension {
                definition: ExtensionDefinition::new("stats"),
                exits: Arc::clone(&exits),
            }) as BoxedExtension)
        });
        loader
    }

    fn ping(id: u64, user: u64) -> Interaction {
        Interaction::Command(CommandInteraction {
            id: InteractionId::new(id),
            token: "token".into(),
            command_name: "ping".into(),
            options: serde_json::Value::Null,
            user: User::new(user, "tester"),
            member: None,
            guild: None,
            channel_id: None,
            locale: "en-US".into(),
        })
    }

    #[tokio::test]
    async fn test_build_requires_gateway() {
        let result = BasaltRuntime::builder()
            .config(config())
            .without_logging()
            .build();
        assert!(matches!(result, Err(RuntimeError::MissingGateway)));
    }

    #[tokio::test]
    async fn test_run_until_channel_closes() {
        let gateway = Arc::new(StubGateway {
            owners: vec![UserId::new(9)],
            ..Default::default()
        });
        let exits = Arc::new(AtomicUsize::new(0));
        let runtime = BasaltRuntime::builder()
            .config(config())
            .shared_gateway(gateway.clone())
            .loader(loader(&exits))
            .without_logging()
            .build()
            .unwrap();

        let (tx, rx) = interaction_channel(8);
        tx.send(ping(1, 1)).await.unwrap();
        tx.send(ping(2, 1)).await.unwrap();
        tx.send(ping(3, 2)).await.unwrap();
        drop(tx);

        runtime.run(rx).await.unwrap();

        assert_eq!(runtime.commands().names(), ["ping"]);
        assert_eq!(runtime.extensions().names(), ["stats"]);
        assert_eq!(gateway.synced.load(Ordering::SeqCst), 1);
        assert!(runtime.dispatcher().owners().contains(UserId::new(9)));
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        // User 1's second ping lands inside the cooldown.
        assert_eq!(*gateway.replies.lock(), ["pong", "pong"]);
    }

    #[tokio::test]
    async fn test_stop_token_ends_run() {
        let gateway = Arc::new(StubGateway {
            fail_owners: true,
            ..Default::default()
        });
        let exits = Arc::new(AtomicUsize::new(0));
        let runtime = BasaltRuntime::builder()
            .config(config())
            .shared_gateway(gateway)
            .loader(loader(&exits))
            .without_logging()
            .build()
            .unwrap();

        let (_tx, rx) = interaction_channel(8);
        let token = runtime.shutdown_token();
        token.cancel();
        runtime.run(rx).await.unwrap();

        assert!(runtime.dispatcher().owners().is_empty());
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_directories_are_skipped() {
        let mut config = config();
        config.commands.dir = "nowhere/commands".into();
        config.extensions.dir = "nowhere/extensions".into();
        let runtime = BasaltRuntime::builder()
            .config(config)
            .gateway(StubGateway::default())
            .without_logging()
            .build()
            .unwrap();

        runtime.start().await.unwrap();
        assert!(runtime.commands().is_empty());
    }
}
