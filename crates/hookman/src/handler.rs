//! Handlers, handler sets, and the sequential fan-out that invokes them.
//!
//! A [`Handler`] is a cheaply cloneable reference to an async callback.
//! Identity is the allocation: clones of one handler are the same handler,
//! two handlers built from identical closures are not. That is what makes
//! registering the same handler twice a no-op.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use hookman_transport::CloseDetails;
use serde_json::Value;

use crate::error::{HandlerError, HandlerFailure, HookmanError};

/// What a handler returns.
pub type HandlerResult = Result<(), HandlerError>;

type HandlerFn<A> = dyn Fn(A) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// An async callback taking an `A`.
pub struct Handler<A> {
    f: Arc<HandlerFn<A>>,
}

impl<A: 'static> Handler<A> {
    /// Wraps an async closure.
    ///
    /// ```rust
    /// use hookman::Handler;
    /// use serde_json::Value;
    ///
    /// let h: Handler<Value> = Handler::new(|payload| async move {
    ///     println!("got {payload}");
    ///     Ok(())
    /// });
    /// ```
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            f: Arc::new(move |arg: A| -> BoxFuture<'static, HandlerResult> {
                Box::pin(f(arg))
            }),
        }
    }

    /// Wraps a synchronous closure that cannot fail.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |arg: A| -> BoxFuture<'static, HandlerResult> {
                f(arg);
                Box::pin(std::future::ready(Ok(())))
            }),
        }
    }
}

impl<A> Handler<A> {
    /// Returns `true` if both values refer to the same handler.
    pub fn same(&self, other: &Self) -> bool {
        // Compare data pointers only; vtable pointers for one closure type
        // are not guaranteed unique.
        std::ptr::eq(
            Arc::as_ptr(&self.f) as *const (),
            Arc::as_ptr(&other.f) as *const (),
        )
    }

    fn call(&self, arg: A) -> BoxFuture<'static, HandlerResult> {
        (self.f)(arg)
    }
}

impl<A> Clone for Handler<A> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<A> PartialEq for Handler<A> {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl<A> Eq for Handler<A> {}

impl<A> fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.f) as *const ())
    }
}

// ---------------------------------------------------------------------------
// HandlerSet
// ---------------------------------------------------------------------------

/// Handlers unique by identity, kept in registration order.
#[derive(Debug)]
pub struct HandlerSet<A> {
    handlers: Vec<Handler<A>>,
}

impl<A> HandlerSet<A> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Adds `handler`. Returns `false` if it was already present.
    pub fn insert(&mut self, handler: &Handler<A>) -> bool {
        if self.contains(handler) {
            return false;
        }
        self.handlers.push(handler.clone());
        true
    }

    /// Removes `handler`. Returns `false` if it wasn't present.
    pub fn remove(&mut self, handler: &Handler<A>) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| !h.same(handler));
        self.handlers.len() != before
    }

    /// Returns `true` if `handler` is in the set.
    pub fn contains(&self, handler: &Handler<A>) -> bool {
        self.handlers.iter().any(|h| h.same(handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Snapshots the set into a fan-out delivering `arg` to each handler.
    ///
    /// The snapshot is independent of the set: handlers added or removed
    /// while it runs don't affect it.
    pub fn fan_out(&self, target: impl Into<String>, arg: A) -> FanOut<A> {
        FanOut {
            target: target.into(),
            handlers: self.handlers.clone(),
            arg,
        }
    }
}

impl<A> Default for HandlerSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// FanOut
// ---------------------------------------------------------------------------

/// One delivery of a value to a snapshot of handlers.
pub struct FanOut<A> {
    target: String,
    handlers: Vec<Handler<A>>,
    arg: A,
}

impl<A> FanOut<A> {
    /// What is being dispatched to, e.g. `connect` or `topic 'news'`.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A: Clone + Send + 'static> FanOut<A> {
    /// Invokes every handler in registration order, awaiting each before
    /// starting the next.
    ///
    /// A handler that returns `Err` or panics doesn't stop the rest; each
    /// failure comes back as a [`HookmanError::Handler`].
    pub async fn run(self) -> Vec<HookmanError> {
        let mut failures = Vec::new();
        for handler in self.handlers {
            let arg = self.arg.clone();
            // Build the future inside the guarded block so a panic in the
            // closure body itself is caught too.
            let invocation = AssertUnwindSafe(async move { handler.call(arg).await });
            let failure = match invocation.catch_unwind().await {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => HandlerFailure::Failed(Arc::from(e)),
                Err(panic) => HandlerFailure::Panicked(panic_message(panic.as_ref())),
            };
            failures.push(HookmanError::Handler {
                target: self.target.clone(),
                failure,
            });
        }
        failures
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle events
// ---------------------------------------------------------------------------

/// The lifecycle events a client emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookmanEvent {
    Connect,
    Disconnect,
    Message,
    Error,
}

impl HookmanEvent {
    /// The event's name: `connect`, `disconnect`, `message` or `error`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Message => "message",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for HookmanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of the `connect` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    /// Token the service issued for this connection. Peers use it to
    /// address unicast messages to this client.
    pub client_token: Option<String>,
}

/// A listener for one lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listener {
    Connect(Handler<ConnectInfo>),
    Disconnect(Handler<CloseDetails>),
    Message(Handler<Value>),
    Error(Handler<HookmanError>),
}

impl Listener {
    /// The event this listener is for.
    pub fn event(&self) -> HookmanEvent {
        match self {
            Self::Connect(_) => HookmanEvent::Connect,
            Self::Disconnect(_) => HookmanEvent::Disconnect,
            Self::Message(_) => HookmanEvent::Message,
            Self::Error(_) => HookmanEvent::Error,
        }
    }
}

/// Listener sets for every lifecycle event, one typed set per event.
#[derive(Debug, Default)]
pub struct GeneralHandlers {
    pub(crate) connect: HandlerSet<ConnectInfo>,
    pub(crate) disconnect: HandlerSet<CloseDetails>,
    pub(crate) message: HandlerSet<Value>,
    pub(crate) error: HandlerSet<HookmanError>,
}

impl GeneralHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`. Returns `false` if it was already registered.
    pub fn add(&mut self, listener: &Listener) -> bool {
        match listener {
            Listener::Connect(h) => self.connect.insert(h),
            Listener::Disconnect(h) => self.disconnect.insert(h),
            Listener::Message(h) => self.message.insert(h),
            Listener::Error(h) => self.error.insert(h),
        }
    }

    /// Unregisters `listener`. Returns `false` if it wasn't registered.
    pub fn remove(&mut self, listener: &Listener) -> bool {
        match listener {
            Listener::Connect(h) => self.connect.remove(h),
            Listener::Disconnect(h) => self.disconnect.remove(h),
            Listener::Message(h) => self.message.remove(h),
            Listener::Error(h) => self.error.remove(h),
        }
    }

    /// Number of listeners registered for `event`.
    pub fn count(&self, event: HookmanEvent) -> usize {
        match event {
            HookmanEvent::Connect => self.connect.len(),
            HookmanEvent::Disconnect => self.disconnect.len(),
            HookmanEvent::Message => self.message.len(),
            HookmanEvent::Error => self.error.len(),
        }
    }
}
