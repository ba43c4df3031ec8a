//! Structured oracle answers: JSON Schema validation, then serde.

use anyhow::Result;
use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::errors::CampaignError;
use crate::core::types::{
    AssessmentResult, InputDecision, MonitorVerdict, RemediationPlan, ReportReview, ReviewResult,
    Strategy,
};

/// A typed answer the oracle must produce as a JSON object.
pub trait Decision: DeserializeOwned {
    const NAME: &'static str;
    const SCHEMA: &'static str;
}

macro_rules! decision {
    ($ty:ty, $name:literal, $file:literal) => {
        impl Decision for $ty {
            const NAME: &'static str = $name;
            const SCHEMA: &'static str = include_str!(concat!("../../schemas/", $file));
        }
    };
}

decision!(Strategy, "strategy", "strategy.schema.json");
decision!(ReviewResult, "strategy review", "review.schema.json");
decision!(AssessmentResult, "output assessment", "assessment.schema.json");
decision!(ReportReview, "report review", "report_review.schema.json");
decision!(InputDecision, "next input", "input.schema.json");
decision!(MonitorVerdict, "monitor verdict", "monitor.schema.json");
decision!(RemediationPlan, "remediation plan", "remediation.schema.json");

/// Parse `raw` as `T`, failing with a `Decision` error on malformed JSON,
/// schema violations or shape mismatches.
pub fn parse_decision<T: Decision>(raw: &str) -> Result<T> {
    let name = T::NAME;
    let instance: Value = serde_json::from_str(raw.trim())
        .map_err(|err| CampaignError::decision(format!("{name} is not valid JSON: {err}")))?;
    validate_schema::<T>(&instance)?;
    serde_json::from_value(instance)
        .map_err(|err| CampaignError::decision(format!("{name} has the wrong shape: {err}")).into())
}

fn validate_schema<T: Decision>(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(T::SCHEMA)
        .map_err(|err| CampaignError::configuration(format!("{} schema: {err}", T::NAME)))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| CampaignError::configuration(format!("compile {} schema: {err}", T::NAME)))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(CampaignError::decision(format!(
            "{} failed schema validation: {}",
            T::NAME,
            messages.join("; ")
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{FailureKind, failure_kind};
    use crate::core::types::CommandState;

    #[test]
    fn bundled_schemas_compile() {
        fn check<T: Decision>() {
            let schema: Value = serde_json::from_str(T::SCHEMA).expect("schema json");
            jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&schema)
                .expect("schema compiles");
        }
        check::<Strategy>();
        check::<ReviewResult>();
        check::<AssessmentResult>();
        check::<ReportReview>();
        check::<InputDecision>();
        check::<MonitorVerdict>();
        check::<RemediationPlan>();
    }

    #[test]
    fn parses_valid_strategy() {
        let strategy: Strategy = parse_decision(
            r#"{"strategy": ["nmap -sV 10.0.0.1", "nikto -h 10.0.0.1"], "explanation": "recon first"}"#,
        )
        .expect("parse");
        assert_eq!(strategy.commands.len(), 2);
        assert!(!strategy.approved);
    }

    #[test]
    fn schema_violation_is_decision_error() {
        let err = parse_decision::<ReviewResult>(r#"{"approved": "yes"}"#).unwrap_err();
        assert_eq!(failure_kind(&err), Some(FailureKind::Decision));
        assert!(err.to_string().contains("strategy review"));
    }

    #[test]
    fn non_json_is_decision_error() {
        let err = parse_decision::<InputDecision>("just type yes").unwrap_err();
        assert_eq!(failure_kind(&err), Some(FailureKind::Decision));
    }

    #[test]
    fn report_review_accepts_legacy_key() {
        let review: ReportReview =
            parse_decision(r#"{"Report Approval": true, "feedback": ""}"#).expect("legacy key");
        assert!(review.approved);
        let review: ReportReview =
            parse_decision(r#"{"report_approval": false, "feedback": "add CVSS"}"#).expect("key");
        assert!(!review.approved);
        assert!(parse_decision::<ReportReview>(r#"{"feedback": "x"}"#).is_err());
    }

    #[test]
    fn monitor_state_is_optional() {
        let verdict: MonitorVerdict = parse_decision(r#"{"input_needed": false}"#).expect("bare");
        assert_eq!(verdict.command_state, None);
        let verdict: MonitorVerdict =
            parse_decision(r#"{"input_needed": true, "command_state": "running"}"#)
                .expect("with state");
        assert_eq!(verdict.command_state, Some(CommandState::Running));
        assert!(!verdict.needs_input());
    }

    #[test]
    fn remediation_defaults_to_no_fix() {
        let plan: RemediationPlan = parse_decision(r#"{"explanation": "transient"}"#).expect("plan");
        assert!(plan.fix.is_empty());
    }
}
