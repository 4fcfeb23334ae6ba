pub mod dnd;
pub mod metamodel;
pub mod session;
pub mod sync;

pub use dnd::{DndDescriptor, DragOrigin, DragTracker, Dragged, DropFeedback, NoFeedback, ViewRef, drop_mutations};
pub use metamodel::{DefaultCapabilities, EditorCapabilities, Metamodel};
pub use session::{
    DragEventKind, EditorEvent, EditorSession, SessionBuilder, SessionHandle, SessionSnapshot, ViewSettings,
};
pub use sync::{
    ConversionRequest, ConversionState, GraphMutation, MutationOutcome, SyncEngine, Validated, ValidationRequest,
};
