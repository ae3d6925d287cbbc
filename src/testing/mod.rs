//! In-process simulation doubles for the engine and API seams.
//!
//! A real document engine parses HTML and runs JavaScript; test suites
//! rarely want one. [`SimEngine`] stands in for it: documents "parse"
//! instantly, and a test-supplied [`ScriptBehavior`] closure plays the role
//! of the scripts, registering listeners and click handlers against the
//! [`SimHost`] it is handed. [`RecordingApiFake`] supplies recordable
//! extension-API stubs.
//!
//! # Example
//!
//! ```ignore
//! use webext_harness::testing::{SimEngine, RecordingApiFake};
//!
//! let engine = SimEngine::new().with_behavior(|host, source| {
//!     if source.contains("register-listener") {
//!         let api = host.api().unwrap();
//!         api.add_message_listener(std::sync::Arc::new(|_msg| {
//!             webext_harness::ListenerReply::value(serde_json::json!({"ok": true}))
//!         }));
//!     }
//! });
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::api::{
    ExtensionApi, ExtensionApiFake, ListenerReply, Message, MessageListener, OutboundHook,
};
use crate::engine::{
    DocumentEngine, DocumentHost, DocumentSource, EnvSetup, LifecycleSignal, ReadyState,
};
use crate::error::{Error, Result};
use crate::messaging::MessageTransport;
use crate::surface::Surface;

// ============================================================================
// Types
// ============================================================================

/// Stand-in for script execution: invoked with the host and the source text
/// whenever the engine would have evaluated that text.
pub type ScriptBehavior = Arc<dyn Fn(&SimHost, &str) + Send + Sync>;

/// A simulated DOM event handler.
type Handler = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// SimEngine
// ============================================================================

/// Simulated document engine.
///
/// Every opened document parses immediately. With
/// [`SimEngine::with_deferred_completion`] the document stays interactive
/// after the parse and completes (firing the engine's normal
/// content-loaded and load signals) at the first load wait, simulating
/// subresources that finish later.
pub struct SimEngine {
    /// Script stand-in shared by every host this engine opens.
    behavior: Option<ScriptBehavior>,
    /// Leave documents interactive until the first load wait.
    deferred_completion: bool,
    /// Every host opened by this engine, in open order.
    hosts: Mutex<Vec<Arc<SimHost>>>,
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEngine")
            .field("deferred_completion", &self.deferred_completion)
            .field("host_count", &self.hosts.lock().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SimEngine - Implementation
// ============================================================================

impl SimEngine {
    /// Creates an engine whose documents complete during open.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            behavior: None,
            deferred_completion: false,
            hosts: Mutex::new(Vec::new()),
        }
    }

    /// Sets the script stand-in.
    #[must_use]
    pub fn with_behavior(mut self, behavior: impl Fn(&SimHost, &str) + Send + Sync + 'static) -> Self {
        self.behavior = Some(Arc::new(behavior));
        self
    }

    /// Leaves documents interactive until the first load wait.
    #[inline]
    #[must_use]
    pub fn with_deferred_completion(mut self) -> Self {
        self.deferred_completion = true;
        self
    }

    /// Every host opened so far, in open order.
    #[must_use]
    pub fn hosts(&self) -> Vec<Arc<SimHost>> {
        self.hosts.lock().clone()
    }

    /// Opens a blank document without an injection hook, returning the
    /// concrete host handle.
    pub async fn open_blank(&self) -> Result<Arc<SimHost>> {
        self.open_sim(DocumentSource::blank(), None).await
    }

    /// Opens a document, applying the optional injection hook before the
    /// simulated parse.
    async fn open_sim(
        &self,
        source: DocumentSource,
        setup: Option<EnvSetup>,
    ) -> Result<Arc<SimHost>> {
        let host = Arc::new(SimHost::new(self.behavior.clone()));

        if let Some(setup) = setup {
            setup(host.as_ref())?;
        }

        // Inline execution: a file's content stands in for its inline
        // scripts and runs during the parse.
        if let DocumentSource::File(path) = &source {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                Error::engine(format!("cannot open document {}: {}", path.display(), e))
            })?;
            host.run_behavior(&content);
        }

        if self.deferred_completion {
            host.set_ready_state(ReadyState::Interactive);
        } else {
            // Completion during the parse happens before anything could
            // observe it, so no signals are recorded.
            host.set_ready_state(ReadyState::Complete);
        }

        self.hosts.lock().push(Arc::clone(&host));
        Ok(host)
    }
}

#[async_trait]
impl DocumentEngine for SimEngine {
    async fn open(&self, source: DocumentSource, setup: EnvSetup) -> Result<Arc<dyn DocumentHost>> {
        let host = self.open_sim(source, Some(setup)).await?;
        Ok(host)
    }
}

// ============================================================================
// SimHost
// ============================================================================

/// Simulated window-like document environment.
///
/// Records every evaluation and signal dispatch so tests can assert on the
/// exact lifecycle a context observed.
pub struct SimHost {
    /// Script stand-in.
    behavior: Option<ScriptBehavior>,
    /// Current readiness.
    ready_state: Mutex<ReadyState>,
    /// Attached fake API handle.
    api: Mutex<Option<Arc<dyn ExtensionApi>>>,
    /// Signals dispatched after the parse, in dispatch order.
    dispatched: Mutex<Vec<LifecycleSignal>>,
    /// Handlers installed per signal.
    signal_handlers: Mutex<FxHashMap<LifecycleSignal, Vec<Handler>>>,
    /// Click handlers by element id.
    click_handlers: Mutex<FxHashMap<String, Vec<Handler>>>,
    /// Click handlers by selector, in registration order.
    selector_handlers: Mutex<FxHashMap<String, Vec<Handler>>>,
    /// Source text passed to `evaluate`, in evaluation order.
    evaluated: Mutex<Vec<String>>,
    /// Coverage object accumulated by "instrumented" scripts.
    coverage: Mutex<Option<Value>>,
    /// Set once the environment is released.
    closed: AtomicBool,
}

impl fmt::Debug for SimHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimHost")
            .field("ready_state", &*self.ready_state.lock())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SimHost - Implementation
// ============================================================================

impl SimHost {
    /// Creates a loading host.
    fn new(behavior: Option<ScriptBehavior>) -> Self {
        Self {
            behavior,
            ready_state: Mutex::new(ReadyState::Loading),
            api: Mutex::new(None),
            dispatched: Mutex::new(Vec::new()),
            signal_handlers: Mutex::new(FxHashMap::default()),
            click_handlers: Mutex::new(FxHashMap::default()),
            selector_handlers: Mutex::new(FxHashMap::default()),
            evaluated: Mutex::new(Vec::new()),
            coverage: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the attached fake API handle.
    #[must_use]
    pub fn api(&self) -> Option<Arc<dyn ExtensionApi>> {
        self.api.lock().clone()
    }

    /// Installs a click handler for an element id.
    pub fn on_click(&self, id: impl Into<String>, handler: impl Fn() + Send + Sync + 'static) {
        self.click_handlers
            .lock()
            .entry(id.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Registers a simulated element matching `selector`.
    pub fn on_selector_click(
        &self,
        selector: impl Into<String>,
        handler: impl Fn() + Send + Sync + 'static,
    ) {
        self.selector_handlers
            .lock()
            .entry(selector.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Installs a lifecycle signal handler, as an evaluated script would.
    pub fn on_signal(&self, signal: LifecycleSignal, handler: impl Fn() + Send + Sync + 'static) {
        self.signal_handlers
            .lock()
            .entry(signal)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Sets the accumulated coverage object.
    pub fn set_coverage(&self, coverage: Value) {
        *self.coverage.lock() = Some(coverage);
    }

    /// Signals dispatched after the parse, in dispatch order.
    #[must_use]
    pub fn dispatched(&self) -> Vec<LifecycleSignal> {
        self.dispatched.lock().clone()
    }

    /// Source text passed to `evaluate`, in evaluation order.
    #[must_use]
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().clone()
    }

    /// Returns `true` once the environment was released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Runs the script stand-in against this host.
    fn run_behavior(&self, source: &str) {
        if let Some(behavior) = &self.behavior {
            behavior(self, source);
        }
    }

    /// Sets the readiness value.
    fn set_ready_state(&self, state: ReadyState) {
        *self.ready_state.lock() = state;
    }

    /// Completes the document the way the engine would: terminal readiness
    /// followed by the content-loaded and load signals.
    fn complete_load(&self) -> Result<()> {
        self.set_ready_state(ReadyState::Complete);
        self.dispatch(LifecycleSignal::ContentLoaded)?;
        self.dispatch(LifecycleSignal::Load)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentHost for SimHost {
    fn ready_state(&self) -> ReadyState {
        *self.ready_state.lock()
    }

    fn attach_api(&self, api: Arc<dyn ExtensionApi>) -> Result<()> {
        *self.api.lock() = Some(api);
        Ok(())
    }

    async fn evaluate(&self, source: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::engine("evaluate on a closed document"));
        }
        self.evaluated.lock().push(source.to_string());
        self.run_behavior(source);
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<()> {
        if !self.ready_state().is_complete() {
            // Pending subresources finish as soon as something waits.
            self.complete_load()?;
        }
        Ok(())
    }

    fn dispatch(&self, signal: LifecycleSignal) -> Result<()> {
        self.dispatched.lock().push(signal);
        let handlers: Vec<Handler> = self
            .signal_handlers
            .lock()
            .get(&signal)
            .cloned()
            .unwrap_or_default();
        for handler in &handlers {
            handler();
        }
        Ok(())
    }

    async fn click_element_by_id(&self, id: &str) -> Result<()> {
        let handlers: Vec<Handler> = self
            .click_handlers
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_default();
        if handlers.is_empty() {
            return Err(Error::engine(format!("no element with id '{}'", id)));
        }
        for handler in &handlers {
            handler();
        }
        Ok(())
    }

    async fn click_last_matching(&self, selector: &str) -> Result<()> {
        let handler: Option<Handler> = self
            .selector_handlers
            .lock()
            .get(selector)
            .and_then(|handlers| handlers.last().cloned());
        match handler {
            Some(handler) => {
                handler();
                Ok(())
            }
            None => Err(Error::engine(format!(
                "no element matching selector '{}'",
                selector
            ))),
        }
    }

    fn coverage(&self) -> Option<Value> {
        self.coverage.lock().clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// RecordingApiFake
// ============================================================================

/// Factory producing one [`RecordingApi`] per context, keeping every
/// created handle for later inspection.
#[derive(Default)]
pub struct RecordingApiFake {
    /// Every handle created, in creation order.
    created: Mutex<Vec<Arc<RecordingApi>>>,
}

impl fmt::Debug for RecordingApiFake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingApiFake")
            .field("created", &self.created.lock().len())
            .finish()
    }
}

impl RecordingApiFake {
    /// Creates an empty factory.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every handle created so far, in creation order.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<RecordingApi>> {
        self.created.lock().clone()
    }
}

impl ExtensionApiFake for RecordingApiFake {
    fn create(&self) -> Arc<dyn ExtensionApi> {
        let api = Arc::new(RecordingApi::default());
        self.created.lock().push(Arc::clone(&api));
        api
    }
}

// ============================================================================
// RecordingApi
// ============================================================================

/// Recordable fake extension API for one context.
#[derive(Default)]
pub struct RecordingApi {
    /// Listeners registered via `add_message_listener`.
    listeners: Mutex<Vec<MessageListener>>,
    /// Outbound override installed by wiring.
    outbound: Mutex<Option<OutboundHook>>,
    /// Inbound routing target installed on the background context.
    inbound_route: Mutex<Option<(Arc<MessageTransport>, Surface)>>,
    /// Outbound call history.
    sent: Mutex<Vec<Message>>,
    /// Set when stub behaviors were populated.
    stubs_populated: AtomicBool,
}

impl fmt::Debug for RecordingApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingApi")
            .field("listeners", &self.listener_count())
            .field("sent", &self.sent.lock().len())
            .field("outbound_override", &self.has_outbound_override())
            .finish()
    }
}

impl RecordingApi {
    /// Returns `true` if stub behaviors were populated.
    #[must_use]
    pub fn stubs_populated(&self) -> bool {
        self.stubs_populated.load(Ordering::SeqCst)
    }

    /// Returns `true` if wiring replaced the outbound stub.
    #[must_use]
    pub fn has_outbound_override(&self) -> bool {
        self.outbound.lock().is_some()
    }

    /// Outbound call history, in call order.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Number of registered inbound listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl ExtensionApi for RecordingApi {
    fn populate_stubs(&self) -> Result<()> {
        self.stubs_populated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn add_message_listener(&self, listener: MessageListener) {
        if let Some((transport, surface)) = self.inbound_route.lock().clone() {
            transport.register_listener(surface, Arc::clone(&listener));
        }
        self.listeners.lock().push(listener);
    }

    fn send_message(&self, message: &Message) -> Option<ListenerReply> {
        self.sent.lock().push(message.clone());
        let hook = self.outbound.lock().clone();
        hook.and_then(|hook| hook(message))
    }

    fn route_inbound(&self, transport: Arc<MessageTransport>, surface: Surface) {
        // Listeners registered before routing still reach the transport.
        for listener in self.listeners.lock().iter() {
            transport.register_listener(surface, Arc::clone(listener));
        }
        *self.inbound_route.lock() = Some((transport, surface));
    }

    fn route_outbound(&self, hook: OutboundHook) {
        *self.outbound.lock() = Some(hook);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_open_missing_file_is_engine_error() {
        let engine = SimEngine::new();
        let err = match engine
            .open(
                DocumentSource::File("/nonexistent/page.html".into()),
                Box::new(|_| Ok(())),
            )
            .await
        {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Engine { .. }));
    }

    #[tokio::test]
    async fn test_file_content_runs_as_inline_script() {
        let dir = tempfile::tempdir().expect("tempdir");
        let page = dir.path().join("page.html");
        std::fs::write(&page, "inline-marker").expect("write page");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = SimEngine::new().with_behavior({
            let seen = Arc::clone(&seen);
            move |_host: &SimHost, source: &str| {
                seen.lock().push(source.to_string());
            }
        });

        engine
            .open(DocumentSource::File(page), Box::new(|_| Ok(())))
            .await
            .expect("open");

        assert_eq!(&*seen.lock(), &vec!["inline-marker".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_document_completes_immediately() {
        let engine = SimEngine::new();
        let host = engine.open_blank().await.expect("open");
        assert!(host.ready_state().is_complete());
        assert!(host.dispatched().is_empty());
    }

    #[tokio::test]
    async fn test_deferred_completion_fires_normal_sequence_on_wait() {
        let engine = SimEngine::new().with_deferred_completion();
        let host = engine.open_blank().await.expect("open");
        assert_eq!(host.ready_state(), ReadyState::Interactive);

        host.wait_for_load().await.expect("wait");

        assert!(host.ready_state().is_complete());
        assert_eq!(
            host.dispatched(),
            vec![LifecycleSignal::ContentLoaded, LifecycleSignal::Load]
        );
    }

    #[tokio::test]
    async fn test_dispatch_invokes_installed_handlers() {
        let engine = SimEngine::new();
        let host = engine.open_blank().await.expect("open");

        let fired = Arc::new(AtomicBool::new(false));
        {
            let fired = Arc::clone(&fired);
            host.on_signal(LifecycleSignal::ReadyStateChange, move || {
                fired.store(true, Ordering::SeqCst);
            });
        }

        host.dispatch(LifecycleSignal::ReadyStateChange)
            .expect("dispatch");
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_click_last_matching_uses_last_registration() {
        let engine = SimEngine::new();
        let host = engine.open_blank().await.expect("open");

        let hits = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "last"] {
            let hits = Arc::clone(&hits);
            host.on_selector_click(".item", move || hits.lock().push(label));
        }

        host.click_last_matching(".item").await.expect("click");
        assert_eq!(&*hits.lock(), &vec!["last"]);
    }

    #[test]
    fn test_recording_api_routes_inbound_listeners() {
        let api = RecordingApi::default();
        let transport = Arc::new(MessageTransport::new());

        // Registered before routing: flushed when the route installs.
        api.add_message_listener(Arc::new(|_msg| ListenerReply::value(json!(1))));
        api.route_inbound(Arc::clone(&transport), Surface::Background);
        // Registered after routing: forwarded directly.
        api.add_message_listener(Arc::new(|_msg| ListenerReply::value(json!(2))));

        assert_eq!(transport.listener_count(Surface::Background), 2);
        assert_eq!(api.listener_count(), 2);
    }

    #[test]
    fn test_recording_api_send_without_override() {
        let api = RecordingApi::default();
        assert!(api.send_message(&json!({"method": "x"})).is_none());
        assert_eq!(api.sent_messages(), vec![json!({"method": "x"})]);
        assert!(!api.has_outbound_override());
    }

    #[test]
    fn test_recording_api_send_with_override() {
        let api = RecordingApi::default();
        api.route_outbound(Arc::new(|message| {
            Some(ListenerReply::value(json!({"echo": message.clone()})))
        }));

        let reply = api
            .send_message(&json!("ping"))
            .and_then(ListenerReply::into_value);
        assert_eq!(reply, Some(json!({"echo": "ping"})));
    }
}
