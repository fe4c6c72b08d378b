pub mod frame;
pub mod gpu;
pub mod pipeline;
pub mod scene;
pub mod tessellate;
pub mod text;

pub use scene::{render_tick, DrawCommand, PanelError, PanelKind, PanelSurface, Scene, SkipReason, Tick};
