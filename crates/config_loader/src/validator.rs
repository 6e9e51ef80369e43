//! Config validation
//!
//! Rules:
//! - field ranges declared on the blueprint types (limit, period, capacities)
//! - a chunk index is scripted to fail at most one way
//!
//! Warnings (non-fatal):
//! - empty workload
//! - scripted failures past the last chunk
//! - settings that have no effect in the chosen mode

use std::collections::HashSet;

use contracts::{ContractError, DispatchMode, RelayBlueprint};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Validate a RelayBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_scripted_failures(blueprint)?;
    Ok(())
}

/// Collect non-fatal configuration issues
pub fn collect_warnings(blueprint: &RelayBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let chunks = blueprint.chunk_count();

    if blueprint.workload.items == 0 {
        warnings.push("workload.items is 0 - nothing will be dispatched".to_string());
    }

    let scripted = [
        ("service.fail_chunks", &blueprint.service.fail_chunks),
        ("service.refuse_chunks", &blueprint.service.refuse_chunks),
    ];
    for (field, indices) in scripted {
        for &index in indices.iter().filter(|&&i| i >= chunks) {
            warnings.push(format!(
                "{field}: chunk {index} is beyond the last chunk ({chunks} chunks) and will never fail"
            ));
        }
    }

    if blueprint.dispatcher.mode == DispatchMode::Sequential
        && blueprint.dispatcher.max_in_flight.is_some()
    {
        warnings.push("dispatcher.max_in_flight has no effect in sequential mode".to_string());
    }

    warnings
}

fn validate_fields(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let Err(errors) = blueprint.validate() else {
        return Ok(());
    };
    let (field, message) = first_violation(&errors, "")
        .unwrap_or_else(|| ("blueprint".to_string(), errors.to_string()));
    Err(ContractError::config_validation(field, message))
}

/// Walk nested validation errors down to the first failing field
fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        let found = match kind {
            ValidationErrorsKind::Field(errs) => errs.first().map(|e| (path, describe(e))),
            ValidationErrorsKind::Struct(inner) => first_violation(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, inner)| first_violation(inner, &format!("{path}[{idx}]"))),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn describe(error: &ValidationError) -> String {
    match &error.message {
        Some(message) => message.to_string(),
        None => format!("failed '{}' check", error.code),
    }
}

/// A chunk cannot be scripted to both fail and be refused
fn validate_scripted_failures(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let failing: HashSet<_> = blueprint.service.fail_chunks.iter().collect();
    for index in &blueprint.service.refuse_chunks {
        if failing.contains(index) {
            return Err(ContractError::config_validation(
                "service.refuse_chunks",
                format!("chunk {index} is also listed in service.fail_chunks"),
            ));
        }
    }
    Ok(())
}
