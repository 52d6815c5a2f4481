//! Actuator behaviors: sweeping while no stable view exists, correcting once one does.

pub mod scan;
pub mod track;

pub use scan::{ScanBehavior, DEFAULT_SWEEP_STEP};
pub use track::{
    Correction, ErrorAxis, PanPolarity, SelectionPolicy, TrackOutcome, TrackingBehavior,
    DEFAULT_CORRECTION_STEP, DEFAULT_TOLERANCE_PX,
};
