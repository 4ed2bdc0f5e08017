//! The middleware pipeline.
//!
//! A pipeline is an ordered list of middlewares followed by a terminal
//! service. Each middleware receives the context and a [`Next`] handle;
//! awaiting [`Next::run`] runs the rest of the chain and returns its result.
//! A middleware that returns without calling `next` stops the invocation
//! there: later middlewares and the terminal never run.
//!
//! ```rust,ignore
//! pipeline.add_middleware(|ctx: Arc<InvocationContext>, next: Next| async move {
//!     let started = Instant::now();
//!     let result = next.run().await;
//!     debug!(command = %ctx.command_name(), elapsed = ?started.elapsed(), "Finished");
//!     result
//! });
//! ```
//!
//! Every invocation runs against the middleware list as it was when the
//! invocation started; adding or removing middlewares does not affect
//! invocations already in flight.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use parking_lot::RwLock;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceExt};
use tracing::warn;

use crate::context::InvocationContext;
use crate::error::ProtocolError;

/// The final stage of a pipeline.
pub type Terminal = BoxCloneSyncService<Arc<InvocationContext>, (), BoxError>;

/// An interceptor in the pipeline.
///
/// Implemented for any `Fn(Arc<InvocationContext>, Next) -> impl Future`.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: Arc<InvocationContext>, next: Next) -> Result<(), BoxError>;
}

#[async_trait]
impl<F, Fut> Middleware for F
where
    F: Fn(Arc<InvocationContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn handle(&self, ctx: Arc<InvocationContext>, next: Next) -> Result<(), BoxError> {
        self(ctx, next).await
    }
}

type Chain = Arc<[Arc<dyn Middleware>]>;

/// Continuation of the chain after the current middleware.
///
/// May be run at most once.
pub struct Next {
    chain: Chain,
    index: usize,
    terminal: Terminal,
    ctx: Arc<InvocationContext>,
    called: AtomicBool,
}

impl Next {
    /// Runs the remaining middlewares and the terminal.
    ///
    /// A second call fails with [`ProtocolError::NextCalledTwice`] without
    /// running anything.
    pub fn run(&self) -> BoxFuture<'static, Result<(), BoxError>> {
        if self.called.swap(true, Ordering::SeqCst) {
            let index = self.index - 1;
            warn!(index, command = %self.ctx.command_name(), "Middleware called next() twice");
            let err: BoxError = ProtocolError::NextCalledTwice { index }.into();
            return future::ready(Err(err)).boxed();
        }
        run_from(
            Arc::clone(&self.chain),
            self.index,
            self.terminal.clone(),
            Arc::clone(&self.ctx),
        )
    }

    /// Position of the middleware that received this handle.
    pub fn caller_index(&self) -> usize {
        self.index - 1
    }
}

fn run_from(
    chain: Chain,
    index: usize,
    terminal: Terminal,
    ctx: Arc<InvocationContext>,
) -> BoxFuture<'static, Result<(), BoxError>> {
    match chain.get(index).cloned() {
        Some(middleware) => {
            let next = Next {
                chain,
                index: index + 1,
                terminal,
                ctx: Arc::clone(&ctx),
                called: AtomicBool::new(false),
            };
            async move { middleware.handle(ctx, next).await }.boxed()
        }
        None => terminal.oneshot(ctx).boxed(),
    }
}

/// Handle returned by [`Pipeline::add_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(u64);

struct Registered {
    entries: Vec<(MiddlewareId, Arc<dyn Middleware>)>,
    chain: Chain,
}

impl Registered {
    fn rebuild(&mut self) {
        self.chain = self.entries.iter().map(|(_, m)| Arc::clone(m)).collect();
    }
}

struct PipelineInner {
    registered: RwLock<Registered>,
    next_id: AtomicU64,
    terminal: Terminal,
}

/// Ordered middlewares plus a terminal service.
///
/// Cheap to clone; clones share the same middleware list.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub fn new(terminal: Terminal) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                registered: RwLock::new(Registered {
                    entries: Vec::new(),
                    chain: Arc::new([]),
                }),
                next_id: AtomicU64::new(0),
                terminal,
            }),
        }
    }

    /// Appends a middleware to the end of the chain.
    pub fn add_middleware<M: Middleware>(&self, middleware: M) -> MiddlewareId {
        let id = MiddlewareId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registered = self.inner.registered.write();
        registered.entries.push((id, Arc::new(middleware)));
        registered.rebuild();
        id
    }

    /// Removes a middleware. Returns `false` if it was not registered.
    pub fn remove_middleware(&self, id: MiddlewareId) -> bool {
        let mut registered = self.inner.registered.write();
        let before = registered.entries.len();
        registered.entries.retain(|(entry, _)| *entry != id);
        if registered.entries.len() == before {
            return false;
        }
        registered.rebuild();
        true
    }

    pub fn len(&self) -> usize {
        self.inner.registered.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the whole chain for `ctx`.
    pub fn run(&self, ctx: Arc<InvocationContext>) -> BoxFuture<'static, Result<(), BoxError>> {
        let chain = Arc::clone(&self.inner.registered.read().chain);
        run_from(chain, 0, self.inner.terminal.clone(), ctx)
    }
}

impl Service<Arc<InvocationContext>> for Pipeline {
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<InvocationContext>) -> Self::Future {
        self.run(ctx)
    }
}
