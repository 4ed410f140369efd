//! Stage and pipeline template domain types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single unit of pipeline work
///
/// Stage definitions are immutable once a template is built. The nominal
/// duration is the simulation baseline and the reference for the stage's
/// implicit timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    /// Human-readable stage name, unique within a template
    pub name: String,

    /// Expected execution time in milliseconds
    pub nominal_duration_ms: u64,

    /// Probability in [0, 1] that this stage fails absent any tuning
    pub base_failure_probability: f64,

    /// Extra detail appended to the success message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_detail: Option<String>,

    /// Extra detail appended to the failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

impl StageDefinition {
    /// Creates a stage definition without detail messages
    pub fn new(name: impl Into<String>, nominal_duration_ms: u64, base_failure_probability: f64) -> Self {
        Self {
            name: name.into(),
            nominal_duration_ms,
            base_failure_probability,
            success_detail: None,
            failure_detail: None,
        }
    }

    /// Sets the detail messages reported on success and failure
    pub fn with_details(mut self, success: impl Into<String>, failure: impl Into<String>) -> Self {
        self.success_detail = Some(success.into());
        self.failure_detail = Some(failure.into());
        self
    }

    /// Nominal duration as a `Duration`
    pub fn nominal_duration(&self) -> Duration {
        Duration::from_millis(self.nominal_duration_ms)
    }
}

/// An ordered, fixed sequence of stages
///
/// The stage order is fixed for the lifetime of the template; reordering
/// means building a new template. Runs hold the template behind an `Arc`
/// and never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    name: String,
    stages: Vec<StageDefinition>,
}

impl PipelineTemplate {
    /// Creates a template from a name and an ordered list of stages
    pub fn new(name: impl Into<String>, stages: Vec<StageDefinition>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    /// Template name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the template has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by index
    pub fn stage(&self, index: usize) -> Option<&StageDefinition> {
        self.stages.get(index)
    }

    /// Finds a stage and its index by name
    pub fn find(&self, name: &str) -> Option<(usize, &StageDefinition)> {
        self.stages
            .iter()
            .enumerate()
            .find(|(_, stage)| stage.name == name)
    }

    /// The standard four-stage CI/CD template
    ///
    /// commit -> test -> build -> deploy, each with an 8% base failure rate.
    pub fn default_ci() -> Self {
        Self::new(
            "ci-cd",
            vec![
                StageDefinition::new("commit", 1000, 0.08).with_details(
                    "Commit validated: 3 files changed",
                    "Merge conflict detected",
                ),
                StageDefinition::new("test", 3000, 0.08).with_details(
                    "42 tests passed, coverage 94%",
                    "3 unit tests failed",
                ),
                StageDefinition::new("build", 4000, 0.08).with_details(
                    "Docker image built: 245MB, tagged v1.2.3",
                    "Docker image too large (>500MB)",
                ),
                StageDefinition::new("deploy", 2000, 0.08).with_details(
                    "Deployed to production, health check passing",
                    "Production server unavailable",
                ),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ci_template() {
        let template = PipelineTemplate::default_ci();
        assert_eq!(template.name(), "ci-cd");
        assert_eq!(template.len(), 4);

        let names: Vec<&str> = template.stages().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["commit", "test", "build", "deploy"]);
    }

    #[test]
    fn test_find_stage_by_name() {
        let template = PipelineTemplate::default_ci();

        let (index, stage) = template.find("build").unwrap();
        assert_eq!(index, 2);
        assert_eq!(stage.nominal_duration_ms, 4000);

        assert!(template.find("lint").is_none());
    }

    #[test]
    fn test_stage_definition_json_uses_camel_case() {
        let stage = StageDefinition::new("lint", 500, 0.1);
        let json = serde_json::to_value(&stage).unwrap();

        assert_eq!(json["nominalDurationMs"], 500);
        assert_eq!(json["baseFailureProbability"], 0.1);
        assert!(json.get("successDetail").is_none());
    }

    #[test]
    fn test_template_from_json() {
        let json = r#"{
            "name": "docs",
            "stages": [
                { "name": "render", "nominalDurationMs": 200, "baseFailureProbability": 0.0 },
                { "name": "publish", "nominalDurationMs": 300, "baseFailureProbability": 0.2,
                  "failureDetail": "CDN rejected upload" }
            ]
        }"#;

        let template: PipelineTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.name(), "docs");
        assert_eq!(template.stage(1).unwrap().failure_detail.as_deref(), Some("CDN rejected upload"));
        assert_eq!(template.stage(0).unwrap().nominal_duration(), Duration::from_millis(200));
    }
}
