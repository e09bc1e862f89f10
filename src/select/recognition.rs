use serde::{Deserialize, Serialize};

/// Sentinel detection category meaning "all categories".
pub const ALL_DETECTION_CATEGORY: &str = "-1";

/// Fallback detection confidence threshold when the recognizer file does not
/// declare one.
pub const DEFAULT_TYPICAL_DETECTION_THRESHOLD: f64 = 0.2;

/// Fallback classification confidence threshold when the recognizer file does
/// not declare one.
pub const DEFAULT_TYPICAL_CLASSIFICATION_THRESHOLD: f64 = 0.5;

/// Nudges confidence bounds off exact zero. A confidence of 0 would match
/// files with no detections at all, which "all detections" must exclude.
pub const JUST_ABOVE_ZERO: f64 = 0.0001;

/// What the recognition criteria select on, derived from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionKind {
    /// Recognition is switched off; the criteria contribute nothing.
    Empty,
    Detection,
    Classification,
}

/// Recognition-based selection criteria: detection/classification category
/// and confidence ranges, plus the rank-by-confidence toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionSelections {
    pub use_recognition: bool,
    /// "All" category: any detection, regardless of category.
    pub all_detections: bool,
    /// With `all_detections`, inverts the sense: select files whose best
    /// detection falls below the threshold, i.e. empty files.
    pub interpret_all_detections_as_empty: bool,
    pub detection_category: String,
    pub classification_category: String,
    pub detection_conf_lower: f64,
    pub detection_conf_higher: f64,
    pub classification_conf_lower: f64,
    pub classification_conf_higher: f64,
    pub rank_by_detection_confidence: bool,
    pub rank_by_classification_confidence: bool,
}

impl Default for RecognitionSelections {
    fn default() -> Self {
        RecognitionSelections {
            use_recognition: false,
            all_detections: true,
            interpret_all_detections_as_empty: false,
            detection_category: ALL_DETECTION_CATEGORY.to_string(),
            classification_category: String::new(),
            detection_conf_lower: DEFAULT_TYPICAL_DETECTION_THRESHOLD,
            detection_conf_higher: 1.0,
            classification_conf_lower: DEFAULT_TYPICAL_CLASSIFICATION_THRESHOLD,
            classification_conf_higher: 1.0,
            rank_by_detection_confidence: false,
            rank_by_classification_confidence: false,
        }
    }
}

impl RecognitionSelections {
    /// Classify the current state. `Empty` when recognition is switched off;
    /// `Classification` when a classification category is set; `Detection`
    /// otherwise (the detection category defaults to the "all" sentinel, so a
    /// blank one still means a detection select).
    pub fn kind(&self) -> RecognitionKind {
        if !self.use_recognition {
            return RecognitionKind::Empty;
        }
        if self.classification_category.is_empty() {
            RecognitionKind::Detection
        } else {
            RecognitionKind::Classification
        }
    }

    /// The detection confidence range the compiled query should use.
    ///
    /// For the empty interpretation the range inverts: 0 up to just below the
    /// lower threshold, so files whose best detection misses the threshold
    /// qualify. For "all detections" a lower bound of exactly 0 is bumped
    /// just above it, keeping files with no detections out.
    pub fn detection_bounds_for_select(&self) -> (f64, f64) {
        if self.interpret_all_detections_as_empty {
            let upper = self.detection_conf_lower - JUST_ABOVE_ZERO;
            (0.0, if upper < 0.0 { 0.0 } else { upper })
        } else if self.all_detections {
            let lower = if self.detection_conf_lower == 0.0 {
                JUST_ABOVE_ZERO
            } else {
                self.detection_conf_lower
            };
            let higher = if self.detection_conf_higher == 0.0 {
                JUST_ABOVE_ZERO
            } else {
                self.detection_conf_higher
            };
            (lower, higher)
        } else {
            (self.detection_conf_lower, self.detection_conf_higher)
        }
    }

    /// Switch recognition criteria off without discarding the configured
    /// categories and thresholds.
    pub fn clear_uses(&mut self) {
        self.use_recognition = false;
    }
}
