//! Inspection execution.
//!
//! The `InspectionRunner` trait is the seam between the orchestrator and
//! whatever actually runs an inspection's command. `CommandRunner` runs it
//! as a local process and reports the outcome as link-style attributes.
//!
//! A non-zero exit fails the inspection unless one of its attribute rules
//! addresses `byproducts.exit-code`, in which case the rules decide.

use std::path::PathBuf;
use std::process::Command;

use ite10_attestation::link::Link;

use crate::error::VerificationError;
use crate::layout::Inspection;
use crate::predicate::NormalizedPredicate;
use crate::rule::Rule;

const EXIT_CODE_ATTRIBUTE: &str = "byproducts.exit-code";

/// Runs inspections and reports what they observed.
pub trait InspectionRunner: Send + Sync {
    /// Execute `inspection` and return its normalized result.
    fn run(&self, inspection: &Inspection) -> Result<NormalizedPredicate, VerificationError>;
}

/// Runs inspection commands as child processes.
///
/// The command is split on whitespace without shell interpretation.
/// Materials and products are always empty. The result is a link
/// predicate, so an inspection whose `predicates` list excludes
/// [`Link::PREDICATE_TYPE`] fails before anything runs.
#[derive(Debug, Default, Clone)]
pub struct CommandRunner {
    /// Working directory for the child; the current one when `None`.
    pub working_dir: Option<PathBuf>,
}

impl CommandRunner {
    /// Runner that executes in `dir`.
    #[must_use]
    pub const fn in_dir(dir: PathBuf) -> Self {
        Self {
            working_dir: Some(dir),
        }
    }
}

impl InspectionRunner for CommandRunner {
    fn run(&self, inspection: &Inspection) -> Result<NormalizedPredicate, VerificationError> {
        let failed = |reason: String| VerificationError::InspectionFailed {
            inspection: inspection.name.clone(),
            reason,
        };

        if !inspection.predicates.is_empty()
            && !inspection.predicates.iter().any(|p| p == Link::PREDICATE_TYPE)
        {
            return Err(failed(format!(
                "runner produces {}, inspection accepts {}",
                Link::PREDICATE_TYPE,
                inspection.predicates.join(", ")
            )));
        }

        let mut argv = inspection.command.split_whitespace();
        let program = argv
            .next()
            .ok_or_else(|| failed("empty command".to_owned()))?;

        let mut command = Command::new(program);
        command.args(argv);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(inspection = %inspection.name, command = %inspection.command, "running inspection");
        let output = command
            .output()
            .map_err(|e| failed(format!("failed to run {program}: {e}")))?;

        let Some(exit_code) = output.status.code() else {
            return Err(failed("terminated by signal".to_owned()));
        };
        if exit_code != 0 && !checks_exit_code(inspection) {
            return Err(failed(format!("exited with status {exit_code}")));
        }

        let mut predicate = NormalizedPredicate::default();
        let attributes = &mut predicate.attributes;
        attributes.insert("name".to_owned(), inspection.name.clone());
        attributes.insert(
            "command".to_owned(),
            inspection
                .command
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        );
        attributes.insert(EXIT_CODE_ATTRIBUTE.to_owned(), exit_code.to_string());
        attributes.insert(
            "byproducts.stdout".to_owned(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
        );
        attributes.insert(
            "byproducts.stderr".to_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        );
        Ok(predicate)
    }
}

fn checks_exit_code(inspection: &Inspection) -> bool {
    inspection
        .expected_attributes
        .iter()
        .filter_map(|raw| raw.parse::<Rule>().ok())
        .any(|rule| rule.key == EXIT_CODE_ATTRIBUTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspection(command: &str) -> Inspection {
        Inspection {
            name: "smoke".to_owned(),
            command: command.to_owned(),
            predicates: Vec::new(),
            expected_materials: Vec::new(),
            expected_products: Vec::new(),
            expected_attributes: Vec::new(),
        }
    }

    #[test]
    #[cfg(unix)]
    fn successful_command_reports_byproducts() {
        let result = CommandRunner::default().run(&inspection("echo  hello")).unwrap();
        assert_eq!(result.attributes["name"], "smoke");
        assert_eq!(result.attributes["command"], "echo hello");
        assert_eq!(result.attributes["byproducts.exit-code"], "0");
        assert_eq!(result.attributes["byproducts.stdout"], "hello\n");
        assert_eq!(result.attributes["byproducts.stderr"], "");
        assert!(result.materials.is_empty());
        assert!(result.products.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn non_zero_exit_fails() {
        let err = CommandRunner::default().run(&inspection("false")).unwrap_err();
        assert!(matches!(err, VerificationError::InspectionFailed { .. }));
        assert!(err.to_string().contains("exited with status 1"));
    }

    #[test]
    #[cfg(unix)]
    fn exit_code_rule_takes_over_from_status() {
        let mut failing = inspection("false");
        failing.expected_attributes = vec!["byproducts.exit-code isnot 0".to_owned()];
        let result = CommandRunner::default().run(&failing).unwrap();
        assert_eq!(result.attributes["byproducts.exit-code"], "1");
    }

    #[test]
    fn rejects_inspections_expecting_other_predicates() {
        let mut other = inspection("true");
        other.predicates = vec!["https://slsa.dev/provenance/v1".to_owned()];
        let err = CommandRunner::default().run(&other).unwrap_err();
        assert!(err.to_string().contains("inspection accepts"), "{err}");

        let mut link = inspection("definitely-not-a-real-program-ite10");
        link.predicates = vec![Link::PREDICATE_TYPE.to_owned()];
        let err = CommandRunner::default().run(&link).unwrap_err();
        assert!(err.to_string().contains("failed to run"), "{err}");
    }

    #[test]
    #[cfg(unix)]
    fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let runner = CommandRunner::in_dir(dir.path().to_path_buf());
        runner.run(&inspection("test -f marker")).unwrap();
    }

    #[test]
    fn missing_program_fails() {
        let err = CommandRunner::default()
            .run(&inspection("definitely-not-a-real-program-ite10"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }

    #[test]
    fn empty_command_fails() {
        let err = CommandRunner::default().run(&inspection("   ")).unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }
}
