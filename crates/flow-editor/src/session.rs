//! Async editor session: the host-facing side of the editor.
//!
//! A session owns the [`SyncEngine`], the palette and the drag tracker and
//! runs them on one task. Hosts talk to it through a cloneable
//! [`SessionHandle`] and listen on an event channel. The loop waits on three
//! things at once: host commands, the engine's next debounce deadline and
//! catalog change notifications. While a metamodel call is in flight the
//! loop keeps serving commands, so edits made during a cycle are recorded by
//! the engine rather than queued behind it.

use crate::dnd::{
    DndDescriptor, DragOrigin, DragTracker, Dragged, DropFeedback, NoFeedback, ViewRef,
    drop_mutations,
};
use crate::metamodel::{DefaultCapabilities, EditorCapabilities, Metamodel};
use crate::sync::{
    ConversionRequest, ConversionState, GraphMutation, MutationOutcome, SyncEngine,
    ValidationRequest,
};
use flow_core::{
    CellId, DefaultShapes, EditorConfig, FlowError, FlowGraph, MarkerMap, Palette, PaletteLayout,
    Point, ReconcileReport, ShapeFactory,
};
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

/// Palette width until the host reports one.
pub const DEFAULT_PALETTE_WIDTH: f64 = 240.0;

// ─── Events ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEventKind {
    Drag,
    Drop,
}

/// Notifications for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// Graph → text produced new text.
    DslChanged(String),
    /// A validation pass finished and decorations were reconciled.
    ContentValidated {
        markers: MarkerMap,
        report: ReconcileReport,
    },
    SelectionChanged(Option<CellId>),
    DragDrop {
        kind: DragEventKind,
        view: Option<ViewRef>,
        source_component: DragOrigin,
    },
    PaletteLaidOut(PaletteLayout),
}

/// View properties the host can set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSettings {
    /// Zoom in percent, within the configured bounds.
    pub zoom: f64,
    pub grid_size: f64,
    pub read_only: bool,
}

/// Point-in-time copy of the session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub graph: FlowGraph,
    pub text: String,
    pub state: ConversionState,
    pub validated: bool,
    pub selection: Option<CellId>,
    pub view: ViewSettings,
    /// `None` when the palette is disabled (no metamodel).
    pub palette: Option<PaletteLayout>,
}

// ─── Commands ────────────────────────────────────────────────────────────

enum Command {
    SetDsl(String),
    Mutate(GraphMutation, oneshot::Sender<Result<MutationOutcome, FlowError>>),
    SetSelection(Option<CellId>),
    SetGraphToTextSync(bool),
    SetZoom(f64),
    SetGridSize(f64),
    SetReadOnly(bool),
    SetPaletteFilter(String),
    TogglePaletteGroup(String),
    SetPaletteWidth(f64),
    DragOver(Option<DndDescriptor>),
    Drop(Dragged, Point, oneshot::Sender<Result<Vec<CellId>, FlowError>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Cloneable handle for driving a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    fn send(&self, command: Command) -> Result<(), FlowError> {
        self.commands
            .send(command)
            .map_err(|_| FlowError::SessionClosed)
    }

    /// Replace the DSL text (the host's text editor changed).
    pub fn set_dsl(&self, text: impl Into<String>) -> Result<(), FlowError> {
        self.send(Command::SetDsl(text.into()))
    }

    pub async fn mutate(&self, mutation: GraphMutation) -> Result<MutationOutcome, FlowError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Mutate(mutation, tx))?;
        rx.await.map_err(|_| FlowError::SessionClosed)?
    }

    pub fn set_selection(&self, selection: Option<CellId>) -> Result<(), FlowError> {
        self.send(Command::SetSelection(selection))
    }

    pub fn set_graph_to_text_sync(&self, enabled: bool) -> Result<(), FlowError> {
        self.send(Command::SetGraphToTextSync(enabled))
    }

    pub fn set_zoom(&self, percent: f64) -> Result<(), FlowError> {
        self.send(Command::SetZoom(percent))
    }

    pub fn set_grid_size(&self, size: f64) -> Result<(), FlowError> {
        self.send(Command::SetGridSize(size))
    }

    pub fn set_read_only(&self, read_only: bool) -> Result<(), FlowError> {
        self.send(Command::SetReadOnly(read_only))
    }

    pub fn set_palette_filter(&self, filter: impl Into<String>) -> Result<(), FlowError> {
        self.send(Command::SetPaletteFilter(filter.into()))
    }

    pub fn toggle_palette_group(&self, group: impl Into<String>) -> Result<(), FlowError> {
        self.send(Command::TogglePaletteGroup(group.into()))
    }

    pub fn set_palette_width(&self, width: f64) -> Result<(), FlowError> {
        self.send(Command::SetPaletteWidth(width))
    }

    /// The descriptor under the pointer during a drag; `None` when the
    /// pointer is over nothing droppable.
    pub fn drag_over(&self, descriptor: Option<DndDescriptor>) -> Result<(), FlowError> {
        self.send(Command::DragOver(descriptor))
    }

    /// End the drag at `at`. Returns the cells the drop created.
    pub async fn drop(&self, dragged: Dragged, at: Point) -> Result<Vec<CellId>, FlowError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Drop(dragged, at, tx))?;
        rx.await.map_err(|_| FlowError::SessionClosed)?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, FlowError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| FlowError::SessionClosed)
    }

    pub fn shutdown(&self) -> Result<(), FlowError> {
        self.send(Command::Shutdown)
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────

pub struct SessionBuilder {
    config: EditorConfig,
    metamodel: Option<Arc<dyn Metamodel>>,
    shapes: Arc<dyn ShapeFactory>,
    capabilities: Arc<dyn EditorCapabilities>,
    feedback: Box<dyn DropFeedback>,
    initial_dsl: Option<String>,
    palette_width: f64,
}

impl SessionBuilder {
    pub fn metamodel(mut self, metamodel: Arc<dyn Metamodel>) -> Self {
        self.metamodel = Some(metamodel);
        self
    }

    pub fn shapes(mut self, shapes: Arc<dyn ShapeFactory>) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn capabilities(mut self, capabilities: Arc<dyn EditorCapabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn feedback(mut self, feedback: Box<dyn DropFeedback>) -> Self {
        self.feedback = feedback;
        self
    }

    /// Text to convert once the catalog is loaded.
    pub fn initial_dsl(mut self, text: impl Into<String>) -> Self {
        self.initial_dsl = Some(text.into());
        self
    }

    pub fn palette_width(mut self, width: f64) -> Self {
        self.palette_width = width;
        self
    }

    pub fn build(self) -> (EditorSession, SessionHandle, mpsc::UnboundedReceiver<EditorEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let view = ViewSettings {
            zoom: 100.0,
            grid_size: self.config.grid_size.max(1.0),
            read_only: false,
        };
        let session = EditorSession {
            engine: SyncEngine::new(&self.config, self.shapes.clone()),
            palette: Palette::new(self.palette_width, self.config.palette.clone(), self.shapes),
            palette_enabled: self.metamodel.is_some(),
            tracker: DragTracker::new(),
            metamodel: self.metamodel,
            capabilities: self.capabilities,
            feedback: self.feedback,
            initial_dsl: self.initial_dsl,
            catalog_changes: None,
            selection: None,
            view,
            config: self.config,
            commands: command_rx,
            events: event_tx,
        };
        (
            session,
            SessionHandle {
                commands: command_tx,
            },
            event_rx,
        )
    }
}

// ─── Session ─────────────────────────────────────────────────────────────

pub struct EditorSession {
    config: EditorConfig,
    engine: SyncEngine,
    palette: Palette,
    palette_enabled: bool,
    tracker: DragTracker,
    metamodel: Option<Arc<dyn Metamodel>>,
    capabilities: Arc<dyn EditorCapabilities>,
    feedback: Box<dyn DropFeedback>,
    initial_dsl: Option<String>,
    catalog_changes: Option<broadcast::Receiver<()>>,
    selection: Option<CellId>,
    view: ViewSettings,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<EditorEvent>,
}

/// Loop control after handling a command.
enum Flow {
    Continue,
    Stop,
}

impl EditorSession {
    pub fn builder(config: EditorConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            metamodel: None,
            shapes: Arc::new(DefaultShapes::default()),
            capabilities: Arc::new(DefaultCapabilities),
            feedback: Box::new(NoFeedback),
            initial_dsl: None,
            palette_width: DEFAULT_PALETTE_WIDTH,
        }
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        if self.start().await.is_none() {
            return;
        }

        loop {
            let deadline = self.engine.next_deadline();
            let due = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if let Flow::Stop = self.handle(command) {
                        break;
                    }
                }
                () = due => {
                    if self.run_due_conversion().await.is_none() {
                        break;
                    }
                }
                changed = catalog_changed(&mut self.catalog_changes) => {
                    if changed {
                        if self.reload_catalog().await.is_none() {
                            break;
                        }
                    } else {
                        debug!("session: catalog notifications closed");
                        self.catalog_changes = None;
                    }
                }
            }
        }
        debug!("session: stopped");
    }

    // ─── Startup ────────────────────────────────────────────────────────

    /// Load the catalog and run the first conversion or validation. `None`
    /// means the session was asked to stop meanwhile.
    async fn start(&mut self) -> Option<()> {
        let Some(metamodel) = self.metamodel.clone() else {
            warn!("session: no metamodel configured, palette and DSL sync are disabled");
            self.engine.set_conversion_enabled(false);
            if let Some(text) = self.initial_dsl.take() {
                self.engine.set_text(text, Instant::now());
            }
            return Some(());
        };

        self.catalog_changes = metamodel.subscribe();
        self.reload_catalog().await?;

        // An initial document equal to the current text schedules no
        // conversion, so it is validated as it stands.
        let converting = match self.initial_dsl.take() {
            Some(text) => self.engine.set_text(text, Instant::now()),
            None => false,
        };
        if !converting && let Some(request) = self.engine.begin_validation() {
            self.validate(request).await?;
        }
        Some(())
    }

    async fn reload_catalog(&mut self) -> Option<()> {
        let Some(metamodel) = self.metamodel.clone() else {
            return Some(());
        };
        match self.serve_until(async move { metamodel.load().await }).await? {
            Ok(catalog) => {
                info!(
                    "session: catalog loaded, {} groups, {} entries",
                    catalog.groups().count(),
                    catalog.entry_count()
                );
                let layout = self.palette.set_catalog(catalog).clone();
                self.emit(EditorEvent::PaletteLaidOut(layout));
            }
            Err(err) => warn!("session: catalog load failed: {err}"),
        }
        Some(())
    }

    // ─── Conversion cycle ───────────────────────────────────────────────

    async fn run_due_conversion(&mut self) -> Option<()> {
        let Some(request) = self.engine.poll_conversion(Instant::now()) else {
            return Some(());
        };
        let Some(metamodel) = self.metamodel.clone() else {
            return Some(());
        };

        let validation = match request {
            ConversionRequest::TextToGraph { text, current } => {
                let result = self
                    .serve_until(async move { metamodel.text_to_graph(&text, &current).await })
                    .await?;
                self.engine.finish_text_to_graph(result)
            }
            ConversionRequest::GraphToText { graph } => {
                let result = self
                    .serve_until(async move { metamodel.graph_to_text(&graph).await })
                    .await?;
                let (changed, validation) = self.engine.finish_graph_to_text(result);
                if let Some(text) = changed {
                    self.emit(EditorEvent::DslChanged(text));
                }
                validation
            }
        };
        self.validate(validation).await
    }

    async fn validate(&mut self, request: ValidationRequest) -> Option<()> {
        let result = match self.metamodel.clone() {
            Some(metamodel) => {
                let ValidationRequest { graph, text } = request;
                self.serve_until(async move { metamodel.validate(&graph, &text).await })
                    .await?
            }
            None => Ok(MarkerMap::new()),
        };
        if let Some(validated) = self.engine.finish_validation(result, Instant::now()) {
            if self
                .selection
                .is_some_and(|s| self.engine.graph().cell(s).is_none())
            {
                self.set_selection(None);
            }
            self.emit(EditorEvent::ContentValidated {
                markers: validated.markers,
                report: validated.report,
            });
        }
        Some(())
    }

    /// Await `call` while still handling host commands. `None` when the
    /// session was asked to stop before the call finished.
    async fn serve_until<T>(&mut self, call: impl Future<Output = T>) -> Option<T> {
        tokio::pin!(call);
        loop {
            tokio::select! {
                out = &mut call => return Some(out),
                command = self.commands.recv() => {
                    let command = command?;
                    if let Flow::Stop = self.handle(command) {
                        return None;
                    }
                }
            }
        }
    }

    // ─── Commands ───────────────────────────────────────────────────────

    fn handle(&mut self, command: Command) -> Flow {
        let now = Instant::now();
        match command {
            Command::SetDsl(text) => {
                self.engine.set_text(text, now);
            }
            Command::Mutate(mutation, reply) => {
                let result = if self.view.read_only {
                    Err(FlowError::ReadOnly)
                } else {
                    self.engine.apply_mutation(mutation, now)
                };
                if self
                    .selection
                    .is_some_and(|s| self.engine.graph().cell(s).is_none())
                {
                    self.set_selection(None);
                }
                let _ = reply.send(result);
            }
            Command::SetSelection(selection) => self.set_selection(selection),
            Command::SetGraphToTextSync(enabled) => self.engine.set_graph_to_text_sync(enabled, now),
            Command::SetZoom(percent) => self.view.zoom = self.config.clamp_zoom(percent),
            Command::SetGridSize(size) => self.view.grid_size = size.max(1.0),
            Command::SetReadOnly(read_only) => self.view.read_only = read_only,
            Command::SetPaletteFilter(filter) => {
                if self.palette_enabled {
                    let layout = self.palette.set_filter(&filter).clone();
                    self.emit(EditorEvent::PaletteLaidOut(layout));
                }
            }
            Command::TogglePaletteGroup(group) => {
                if self.palette_enabled {
                    let layout = self.palette.toggle_group(&group).clone();
                    self.emit(EditorEvent::PaletteLaidOut(layout));
                }
            }
            Command::SetPaletteWidth(width) => {
                if self.palette_enabled {
                    let layout = self.palette.set_width(width).clone();
                    self.emit(EditorEvent::PaletteLaidOut(layout));
                }
            }
            Command::DragOver(candidate) => {
                if self.tracker.update(candidate, self.feedback.as_mut())
                    && let Some(current) = self.tracker.current()
                {
                    let event = EditorEvent::DragDrop {
                        kind: DragEventKind::Drag,
                        view: current.target.clone(),
                        source_component: current.source_component,
                    };
                    self.emit(event);
                }
            }
            Command::Drop(dragged, at, reply) => {
                let _ = reply.send(self.finish_drop(dragged, at, now));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    fn finish_drop(&mut self, dragged: Dragged, at: Point, now: Instant) -> Result<Vec<CellId>, FlowError> {
        // The tracker is cleared whatever happens next.
        let Some(descriptor) = self.tracker.finish(self.feedback.as_mut()) else {
            return Ok(Vec::new());
        };
        if self.view.read_only {
            return Err(FlowError::ReadOnly);
        }

        let mutations = drop_mutations(
            self.engine.graph(),
            &descriptor,
            &dragged,
            at,
            self.engine.shapes(),
            self.capabilities.as_ref(),
        );
        let mut created = Vec::new();
        for mutation in mutations {
            let id = match &mutation {
                GraphMutation::AddNode { id, .. } | GraphMutation::AddLink { id, .. } => Some(*id),
                _ => None,
            };
            self.engine.apply_mutation(mutation, now)?;
            created.extend(id);
        }

        self.emit(EditorEvent::DragDrop {
            kind: DragEventKind::Drop,
            view: descriptor.target,
            source_component: descriptor.source_component,
        });
        Ok(created)
    }

    fn set_selection(&mut self, selection: Option<CellId>) {
        if selection == self.selection {
            return;
        }
        match selection {
            Some(id) if self.engine.graph().node(id).is_some() => {
                self.engine.show_handles(id);
            }
            _ => self.engine.hide_handles(),
        }
        self.selection = selection;
        self.emit(EditorEvent::SelectionChanged(selection));
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            graph: self.engine.graph().clone(),
            text: self.engine.text().to_string(),
            state: self.engine.state(),
            validated: self.engine.is_validated(),
            selection: self.selection,
            view: self.view,
            palette: self.palette_enabled.then(|| self.palette.layout().clone()),
        }
    }

    fn emit(&self, event: EditorEvent) {
        if self.events.send(event).is_err() {
            debug!("session: event receiver dropped");
        }
    }
}

/// Resolves on the next catalog notification: `true` for a change (or
/// missed changes), `false` once the sender is gone. Never resolves without
/// a subscription.
async fn catalog_changed(changes: &mut Option<broadcast::Receiver<()>>) -> bool {
    let Some(rx) = changes else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => true,
        Err(broadcast::error::RecvError::Closed) => false,
    }
}
