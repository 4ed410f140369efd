//! Pipeline template loading and validation

use anyhow::{Context, Result};
use gantry_core::domain::stage::PipelineTemplate;
use std::collections::HashSet;
use std::path::Path;

/// Loads a template from a JSON file and validates it
pub fn load_template(path: impl AsRef<Path>) -> Result<PipelineTemplate> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file {}", path.display()))?;

    let template: PipelineTemplate = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse template file {}", path.display()))?;

    validate_template(&template)?;
    Ok(template)
}

/// Validates a template before an engine is built around it
pub fn validate_template(template: &PipelineTemplate) -> Result<()> {
    if template.name().trim().is_empty() {
        anyhow::bail!("Pipeline template name cannot be empty");
    }

    if template.is_empty() {
        anyhow::bail!("Pipeline template '{}' has no stages", template.name());
    }

    let mut seen = HashSet::new();
    for stage in template.stages() {
        if stage.name.trim().is_empty() {
            anyhow::bail!("Stage names cannot be empty");
        }

        if !seen.insert(stage.name.as_str()) {
            anyhow::bail!("Duplicate stage name: {}", stage.name);
        }

        if !(0.0..=1.0).contains(&stage.base_failure_probability) {
            anyhow::bail!(
                "Stage '{}' has failure probability {} outside [0, 1]",
                stage.name,
                stage.base_failure_probability
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::domain::stage::StageDefinition;
    use std::io::Write;

    #[test]
    fn test_default_template_is_valid() {
        assert!(validate_template(&PipelineTemplate::default_ci()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_templates() {
        let empty = PipelineTemplate::new("empty", vec![]);
        assert!(validate_template(&empty).is_err());

        let unnamed = PipelineTemplate::new(" ", vec![StageDefinition::new("a", 10, 0.1)]);
        assert!(validate_template(&unnamed).is_err());

        let duplicate = PipelineTemplate::new(
            "dup",
            vec![
                StageDefinition::new("a", 10, 0.1),
                StageDefinition::new("a", 10, 0.1),
            ],
        );
        let err = validate_template(&duplicate).unwrap_err();
        assert!(err.to_string().contains("Duplicate stage name"));

        let out_of_range = PipelineTemplate::new("p", vec![StageDefinition::new("a", 10, 1.5)]);
        assert!(validate_template(&out_of_range).is_err());
    }

    #[test]
    fn test_load_template_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name":"lint-only","stages":[{{"name":"lint","nominalDurationMs":50,"baseFailureProbability":0.0}}]}}"#
        )
        .unwrap();

        let template = load_template(file.path()).unwrap();
        assert_eq!(template.name(), "lint-only");
        assert_eq!(template.len(), 1);
    }

    #[test]
    fn test_load_template_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = load_template(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse template file"));
    }
}
