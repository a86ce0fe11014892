//! Shared range-validation helpers used by the section validators.

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error unless `value` starts with one of `schemes`.
pub(crate) fn validate_scheme(errors: &mut Vec<String>, name: &str, value: &str, schemes: &[&str]) {
    if !schemes.iter().any(|s| value.starts_with(s)) {
        errors.push(format!(
            "{name} = {value:?} must start with one of {}",
            schemes.join(", ")
        ));
    }
}
