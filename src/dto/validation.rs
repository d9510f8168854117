//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::services::scheduler::CronTimetable;

/// Validates that a schedule expression is a crontab the scheduler accepts (five to seven fields).
///
/// # Examples
///
/// ```ignore
/// validate_crontab("0 20 * * *")   // Ok
/// validate_crontab("0 0 20 * * *") // Ok - with seconds
/// validate_crontab("nightly")      // Err
/// ```
pub fn validate_crontab(expr: &str) -> Result<(), ValidationError> {
    let fields = expr.split_whitespace().count();
    if !(5..=7).contains(&fields) {
        let mut err = ValidationError::new("cron_fields");
        err.message = Some(format!("Cron expression needs 5 to 7 fields (got {fields})").into());
        return Err(err);
    }

    if CronTimetable::parse(expr, chrono_tz::UTC).is_err() {
        let mut err = ValidationError::new("cron_format");
        err.message = Some("Cron expression could not be parsed".into());
        return Err(err);
    }

    Ok(())
}
