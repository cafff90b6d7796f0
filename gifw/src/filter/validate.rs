use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::ValidationIssue;
use crate::filter::{Condition, FilterGroup, FilterNode, GroupOperator, Operator, PropertyType};

/// Checks the filter tree and returns field-scoped messages. An empty list means the tree is valid.
///
/// Fields are named by the node path joined with dots, followed by `value` or `upper`, for
/// example `1.0.value`.
pub fn validate(root: &FilterGroup) -> Vec<ValidationIssue> {
    let mut issues = vec![];
    validate_group(root, &mut vec![], &mut issues);
    issues
}

fn field_name(path: &[usize], field: &str) -> String {
    let mut parts: Vec<String> = path.iter().map(usize::to_string).collect();
    parts.push(field.to_string());
    parts.join(".")
}

fn validate_group(group: &FilterGroup, path: &mut Vec<usize>, issues: &mut Vec<ValidationIssue>) {
    if group.operator == GroupOperator::Not && group.is_empty() {
        issues.push(ValidationIssue::new(
            field_name(path, "group"),
            "A NOT group needs at least one condition",
        ));
    }

    for (index, child) in group.children.iter().enumerate() {
        path.push(index);
        match child {
            FilterNode::Group(inner) => validate_group(inner, path, issues),
            FilterNode::Condition(condition) => validate_condition(condition, path, issues),
        }
        path.pop();
    }
}

fn validate_condition(condition: &Condition, path: &[usize], issues: &mut Vec<ValidationIssue>) {
    if condition.operator.is_unary() {
        return;
    }

    let lower = checked_value(condition, condition.value.as_deref(), path, "value", issues);
    if condition.operator != Operator::Between {
        return;
    }

    let upper = checked_value(condition, condition.upper.as_deref(), path, "upper", issues);
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if lower.partial_cmp(&upper) != Some(Ordering::Less) {
            issues.push(ValidationIssue::new(
                field_name(path, "upper"),
                "The upper value must be greater than the lower value",
            ));
        }
    }
}

#[derive(Debug, PartialEq, PartialOrd)]
enum TypedValue {
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

fn checked_value(
    condition: &Condition,
    value: Option<&str>,
    path: &[usize],
    field: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<TypedValue> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        issues.push(ValidationIssue::new(
            field_name(path, field),
            "A value is required",
        ));
        return None;
    };

    if condition.operator == Operator::Like {
        return Some(TypedValue::Text(value.to_string()));
    }

    let parsed = match condition.property_type {
        PropertyType::String => Some(TypedValue::Text(value.to_string())),
        PropertyType::Int => value
            .parse::<i64>()
            .ok()
            .map(|v| TypedValue::Number(v as f64)),
        PropertyType::Number => value.parse::<f64>().ok().map(TypedValue::Number),
        PropertyType::Date => parse_date(value).map(TypedValue::DateTime),
        PropertyType::DateTime => parse_date_time(value).map(TypedValue::DateTime),
    };

    if parsed.is_none() {
        let message = match condition.property_type {
            PropertyType::Int => "Enter a whole number",
            PropertyType::Number => "Enter a number",
            PropertyType::Date => "Enter a date in the format YYYY-MM-DD",
            _ => "Enter a date and time",
        };
        issues.push(ValidationIssue::new(field_name(path, field), message));
    }

    parsed
}

fn parse_date(value: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_date_time(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").ok())
        .or_else(|| parse_date(value))
}
