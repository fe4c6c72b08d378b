pub mod correlation;
pub mod deviation;
pub mod extrema;
pub mod model;
pub mod pipeline;
pub mod session;

pub use model::{AnalysisResult, ExtremaSet, FrameMeasurement, FrameSeries};
pub use extrema::Spacing;
pub use pipeline::{AnalysisParams, AnalysisState, CancelToken, Pipeline};
pub use session::{RunId, RunStatus, Session};
