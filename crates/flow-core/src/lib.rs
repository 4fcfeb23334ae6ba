pub mod catalog;
pub mod config;
pub mod decorations;
pub mod error;
pub mod fan;
pub mod id;
pub mod model;
pub mod palette;
pub mod shapes;

pub use catalog::Catalog;
pub use config::{EditorConfig, PaletteConfig};
pub use decorations::{ReconcileReport, merge_markers, reconcile_markers, structural_markers};
pub use error::{Direction, FlowError};
pub use fan::FanRouter;
pub use id::CellId;
pub use model::*;
pub use palette::{Palette, PaletteItem, PaletteItemKind, PaletteLayout, PaletteQuery, layout_palette};
pub use shapes::{DefaultShapes, ShapeFactory};

// Re-export geometry types so downstream crates share one kurbo version.
pub use kurbo::{Point, Rect, Size};
