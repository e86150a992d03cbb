//! Status enums and reduction-method parsing.

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// Lifecycle status shared by DataFrame builds, process steps and ML runs.
///
/// Run transitions are externally driven: the orchestrator reports a phase
/// string which is decoded with [`RunStatus::from_phase`]; anything outside
/// the known vocabulary maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Stopped,
    Other,
}

impl RunStatus {
    /// Statuses in which a run is still in flight and worth polling or
    /// eligible for termination.
    pub const ACTIVE: [RunStatus; 3] = [RunStatus::Running, RunStatus::Pending, RunStatus::Scheduled];

    /// Decodes an orchestrator phase string. Unknown phases map to `Other`.
    pub fn from_phase(phase: &str) -> Self {
        match phase {
            "Pending" => RunStatus::Pending,
            "Scheduled" => RunStatus::Scheduled,
            "Running" => RunStatus::Running,
            "Succeeded" => RunStatus::Succeeded,
            "Failed" => RunStatus::Failed,
            "Stopped" => RunStatus::Stopped,
            _ => RunStatus::Other,
        }
    }

    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Scheduled => "Scheduled",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::Stopped => "Stopped",
            RunStatus::Other => "Other",
        }
    }

    /// Parses the database representation. Unknown values map to `Other`,
    /// mirroring [`RunStatus::from_phase`].
    pub fn from_str_lossy(s: &str) -> Self {
        Self::from_phase(s)
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistical reduction applied across all readings of a feature within
/// one process step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReductionMethod {
    Min,
    Max,
    Avg,
    StdDev,
}

impl ReductionMethod {
    /// Column-name suffix for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReductionMethod::Min => "Min",
            ReductionMethod::Max => "Max",
            ReductionMethod::Avg => "Avg",
            ReductionMethod::StdDev => "StdDev",
        }
    }

    /// SQL aggregate function for this method.
    pub fn sql_fn(&self) -> &'static str {
        match self {
            ReductionMethod::Min => "MIN",
            ReductionMethod::Max => "MAX",
            ReductionMethod::Avg => "AVG",
            ReductionMethod::StdDev => "STDDEV",
        }
    }
}

/// Sentinel method name requesting raw time-series output instead of
/// reductions.
pub const STACKED_SENTINEL: &str = "StackedDataFrame";

/// The parsed reduction request for one dataset build.
///
/// Either a set of reduction methods (deduplicated, applied once each per
/// feature) or the stacked mode, in which no reduction is applied and
/// long-format time-series tables are emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionSet {
    methods: Vec<ReductionMethod>,
    stacked: bool,
}

impl ReductionSet {
    /// Parses raw method names as supplied by the job arguments.
    ///
    /// `StackedDataFrame` anywhere in the list switches to stacked mode and
    /// short-circuits further validation; any other unknown name is a
    /// configuration error.
    pub fn parse(raw: &[String]) -> Result<Self, DatasetError> {
        let mut methods = Vec::new();
        for name in raw {
            if name == STACKED_SENTINEL {
                return Ok(Self {
                    methods: Vec::new(),
                    stacked: true,
                });
            }
            let method = match name.as_str() {
                "Min" => ReductionMethod::Min,
                "Max" => ReductionMethod::Max,
                "Avg" => ReductionMethod::Avg,
                "StdDev" => ReductionMethod::StdDev,
                other => return Err(DatasetError::UnsupportedMethod(other.to_string())),
            };
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
        Ok(Self {
            methods,
            stacked: false,
        })
    }

    /// Whether raw time-series output was requested.
    pub fn is_stacked(&self) -> bool {
        self.stacked
    }

    /// The deduplicated methods, in request order.
    pub fn methods(&self) -> &[ReductionMethod] {
        &self.methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_phase_known_vocabulary() {
        assert_eq!(RunStatus::from_phase("Running"), RunStatus::Running);
        assert_eq!(RunStatus::from_phase("Succeeded"), RunStatus::Succeeded);
        assert_eq!(RunStatus::from_phase("Stopped"), RunStatus::Stopped);
    }

    #[test]
    fn test_from_phase_unknown_maps_to_other() {
        assert_eq!(RunStatus::from_phase("Error"), RunStatus::Other);
        assert_eq!(RunStatus::from_phase("Omitted"), RunStatus::Other);
        assert_eq!(RunStatus::from_phase(""), RunStatus::Other);
    }

    #[test]
    fn test_active_statuses() {
        assert!(RunStatus::Running.is_active());
        assert!(RunStatus::Pending.is_active());
        assert!(RunStatus::Scheduled.is_active());
        assert!(!RunStatus::Succeeded.is_active());
        assert!(!RunStatus::Other.is_active());
    }

    #[test]
    fn test_reduction_set_parse_dedups() {
        let set = ReductionSet::parse(&[
            "Min".to_string(),
            "Max".to_string(),
            "Min".to_string(),
        ])
        .unwrap();
        assert_eq!(
            set.methods(),
            &[ReductionMethod::Min, ReductionMethod::Max]
        );
        assert!(!set.is_stacked());
    }

    #[test]
    fn test_reduction_set_parse_stacked_sentinel() {
        let set =
            ReductionSet::parse(&["Min".to_string(), "StackedDataFrame".to_string()]).unwrap();
        assert!(set.is_stacked());
        assert!(set.methods().is_empty());
    }

    #[test]
    fn test_reduction_set_parse_rejects_unknown() {
        let err = ReductionSet::parse(&["Median".to_string()]).unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedMethod(ref m) if m == "Median"));
    }
}
