//! Small declarative checks shared by the per-record validation rules.
//! Each produces a tagged 400-class error instead of panicking or throwing
//! halfway through a write.

use chrono::NaiveDate;

use crate::error::AppError;

pub fn all_filled<'a, I>(values: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = &'a str>,
{
    if values.into_iter().any(|value| value.trim().is_empty()) {
        return Err(AppError::BadRequest(
            "Please fill in all required fields.".to_string(),
        ));
    }
    Ok(())
}

pub fn numbers(message: &str, values: &[f64]) -> Result<(), AppError> {
    if values.iter().any(|value| !value.is_finite()) {
        return Err(AppError::BadRequest(
            "Please input valid numbers.".to_string(),
        ));
    }
    if values.iter().any(|value| *value < 0.0) {
        return Err(AppError::BadRequest(message.to_string()));
    }
    Ok(())
}

pub fn not_after(message: &str, earlier: NaiveDate, later: NaiveDate) -> Result<(), AppError> {
    if earlier > later {
        return Err(AppError::BadRequest(message.to_string()));
    }
    Ok(())
}
