//! Core refinement modules

pub mod stats;
pub mod histogram;
pub mod otsu;
pub mod curve_fit;
pub mod bimodality;
pub mod labeling;
pub mod morphology;
pub mod classifier;
pub mod dark_land;
pub mod bright_water;
pub mod dispatch;
pub mod reconcile;
pub mod pipeline;

// Re-export main types
pub use bimodality::{
    estimate_sweep, BimodalityEstimator, BimodalityThresholds, EstimatorParams, MetricSet,
    SweepEstimate,
};
pub use curve_fit::{fit_bimodal, FitBounds, FitFailure, FitOutcome, GaussianMode};
pub use labeling::{label_components, ComponentLabeling, ConnectedComponent};
pub use classifier::{BandSelection, ComponentJob, ComponentVerdict, PassRasters, RefinementPhase};
pub use dark_land::DarkLandClassifier;
pub use bright_water::{BrightWaterClassifier, GapFillThresholds};
pub use dispatch::ParallelDispatcher;
pub use reconcile::{BlockBoundaryReconciler, PassSummary, PhaseSummary};
pub use pipeline::{RefinementPipeline, RefinementSummary};
