//! The session controller.
//!
//! [`Session`] validates requests synchronously, then hands the heavy part
//! to a worker task keyed by [`OpKind`]. Dispatching while a worker of the
//! same kind is still running cancels and joins it first; the old worker's
//! cancel flag stays set, which marks any result it already produced as
//! stale, and stale results are discarded without an event. All layer
//! mutation happens here, under the layer-map lock, never in backend code.

mod database;
mod io;
mod pipeline;
mod plan;
mod presets;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cloudbench_core::config::LayeredConfig;
use cloudbench_core::models::{
    Bounds, FileMetadata, LayerContext, PointBuffers, RenderStyle, SourceDescriptor,
    SummaryMetadata,
};
use cloudbench_core::ports::{
    CancelFlag, MetadataWriter, PipelineBackend, PipelineWriter, PointReader, PointWriter,
};
use cloudbench_core::registry::ToolRegistry;
use cloudbench_core::render;
use cloudbench_engine::{
    JsonMetadataWriter, JsonPipelineWriter, LasFileReader, LasFileWriter, NativeBackend,
};
use cloudbench_store::{
    MemoryPresetStore, MemoryProfileStore, PatchStoreProvider, PostgresProvider, PresetStore,
    ProfileStore,
};

use crate::events::{LogLevel, OpKind, ProgressUpdate, SessionEvent};

pub use pipeline::ModelParams;

/// The collaborators a [`Session`] is wired with.
///
/// Every field is a trait object, so a host or a test can swap any single
/// piece; [`SessionDeps::native`] wires the complete native stack.
pub struct SessionDeps {
    pub backend: Arc<dyn PipelineBackend>,
    pub reader: Arc<dyn PointReader>,
    pub writer: Arc<dyn PointWriter>,
    pub pipeline_writer: Arc<dyn PipelineWriter>,
    pub metadata_writer: Arc<dyn MetadataWriter>,
    pub store_provider: Arc<dyn PatchStoreProvider>,
    pub presets: Arc<dyn PresetStore>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl SessionDeps {
    /// The native stack: LAS/LAZ file I/O, the native stage interpreter,
    /// JSON pipeline and metadata writers, per-profile PostgreSQL stores,
    /// and in-memory preset and profile storage.
    pub fn native(config: &LayeredConfig) -> Self {
        let reader: Arc<dyn PointReader> = Arc::new(LasFileReader::new());
        Self {
            backend: Arc::new(NativeBackend::new()),
            reader: Arc::clone(&reader),
            writer: Arc::new(LasFileWriter::new()),
            pipeline_writer: Arc::new(JsonPipelineWriter::new()),
            metadata_writer: Arc::new(JsonMetadataWriter::new()),
            store_provider: Arc::new(PostgresProvider::new(Arc::clone(&reader), config.clone())),
            presets: Arc::new(MemoryPresetStore::new()),
            profiles: Arc::new(MemoryProfileStore::new()),
        }
    }
}

/// An in-flight worker: its staleness mark and the handle to join it
struct RunningOp {
    cancel: CancelFlag,
    handle: JoinHandle<()>,
}

pub(crate) struct SessionInner {
    /// Loaded layers by cache key. Locked with `unwrap()`: poisoning only
    /// follows a panicked thread, which is unrecoverable here.
    layers: RwLock<HashMap<String, LayerContext>>,
    registry: ToolRegistry,
    backend: Arc<dyn PipelineBackend>,
    reader: Arc<dyn PointReader>,
    writer: Arc<dyn PointWriter>,
    pipeline_writer: Arc<dyn PipelineWriter>,
    metadata_writer: Arc<dyn MetadataWriter>,
    store_provider: Arc<dyn PatchStoreProvider>,
    presets: Arc<dyn PresetStore>,
    profiles: Arc<dyn ProfileStore>,
    config: LayeredConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    /// One slot per [`OpKind`], indexed by [`OpKind::slot_index`]
    slots: [tokio::sync::Mutex<Option<RunningOp>>; OpKind::COUNT],
}

impl SessionInner {
    /// Send an event; a host that dropped its receiver simply stops
    /// listening, it does not fail the operation.
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Mirror a message to the tracing subscriber and the event stream
    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
        self.emit(SessionEvent::Log { level, message });
    }

    /// Terminal failure path of a worker: one error log, one
    /// [`SessionEvent::OperationFailed`], progress reset to zero.
    fn fail(&self, kind: OpKind, message: String) {
        self.log(LogLevel::Error, message.clone());
        self.emit(SessionEvent::OperationFailed { kind, message });
        self.emit(SessionEvent::Progress(ProgressUpdate::Percent(0)));
    }

    /// Cloned snapshot of a layer. Cheap: the point buffers are shared
    /// behind `Arc`s, only the stage list and cache index are copied.
    fn snapshot(&self, key: &str) -> Option<LayerContext> {
        self.layers.read().unwrap().get(key).cloned()
    }

    fn has_layer(&self, key: &str) -> bool {
        self.layers.read().unwrap().contains_key(key)
    }

    /// Register freshly loaded data as a layer, replacing any layer that
    /// already holds the key. Returns the full-resolution point count.
    #[allow(clippy::too_many_arguments)]
    fn install_layer(
        &self,
        key: &str,
        name: &str,
        source: SourceDescriptor,
        points: PointBuffers,
        bounds: Bounds,
        summary: SummaryMetadata,
        full_metadata: Option<FileMetadata>,
    ) -> u64 {
        let base = Arc::new(points);
        let render_data = render::downsample(&base, self.config.max_visible_points.value);
        let count = base.len() as u64;
        let layer = LayerContext::new(
            source,
            base,
            render_data,
            bounds,
            summary,
            full_metadata,
            self.config.stage_cache_capacity.value,
        );
        let replaced = self
            .layers
            .write()
            .unwrap()
            .insert(key.to_string(), layer)
            .is_some();
        if replaced {
            self.emit(SessionEvent::LayerRemoved {
                key: key.to_string(),
            });
        }
        self.emit(SessionEvent::LayerLoaded {
            key: key.to_string(),
            name: name.to_string(),
        });
        self.emit(SessionEvent::RenderUpdated {
            key: key.to_string(),
        });
        count
    }
}

/// The embeddable session controller. Clones share one underlying session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Build a session and the event stream the host consumes
    pub fn new(
        deps: SessionDeps,
        config: &LayeredConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = SessionInner {
            layers: RwLock::new(HashMap::new()),
            registry: ToolRegistry::builtin(),
            backend: deps.backend,
            reader: deps.reader,
            writer: deps.writer,
            pipeline_writer: deps.pipeline_writer,
            metadata_writer: deps.metadata_writer,
            store_provider: deps.store_provider,
            presets: deps.presets,
            profiles: deps.profiles,
            config: config.clone(),
            events,
            slots: std::array::from_fn(|_| tokio::sync::Mutex::new(None)),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    /// Spawn `work` as the kind's worker, superseding any in-flight one.
    ///
    /// The predecessor is cancelled and joined before the replacement
    /// spawns, so workers of one kind never overlap. Its cancel flag stays
    /// set afterwards, which is what marks a result it already produced as
    /// stale; workers of other kinds are untouched.
    pub(crate) async fn dispatch<F, Fut>(&self, kind: OpKind, work: F)
    where
        F: FnOnce(Arc<SessionInner>, CancelFlag) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let slot = &self.inner.slots[kind.slot_index()];
        let mut guard = slot.lock().await;
        if let Some(previous) = guard.take() {
            previous.cancel.cancel();
            // join rather than abort: the worker observes the flag at its
            // next boundary and unwinds with the layer map consistent
            let _ = previous.handle.await;
        }
        let cancel = CancelFlag::new();
        let handle = tokio::spawn(work(Arc::clone(&self.inner), cancel.clone()));
        *guard = Some(RunningOp { cancel, handle });
    }

    /// Cancel and join every in-flight worker. No completion events are
    /// emitted for work cancelled here.
    pub async fn quiesce(&self) {
        for kind in OpKind::ALL {
            let slot = &self.inner.slots[kind.slot_index()];
            let mut guard = slot.lock().await;
            if let Some(op) = guard.take() {
                op.cancel.cancel();
                let _ = op.handle.await;
            }
        }
    }

    /// Snapshot of a layer, or `None` when the key is unknown
    pub fn layer(&self, key: &str) -> Option<LayerContext> {
        self.inner.snapshot(key)
    }

    /// Keys of all loaded layers, sorted
    pub fn layer_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .layers
            .read()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// The tool catalog backing filters, batches, and presets
    pub fn registry(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &LayeredConfig {
        &self.inner.config
    }

    /// Switch the coloring channel for a layer's next repaint
    pub fn set_active_style(&self, key: &str, style: RenderStyle) {
        let updated = {
            let mut layers = self.inner.layers.write().unwrap();
            match layers.get_mut(key) {
                Some(layer) => {
                    layer.active_style = style;
                    true
                }
                None => false,
            }
        };
        if updated {
            self.inner.emit(SessionEvent::RenderUpdated {
                key: key.to_string(),
            });
        } else {
            self.inner
                .log(LogLevel::Warning, format!("Layer not found: {}", key));
        }
    }
}
