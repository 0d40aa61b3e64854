use crate::error::FieldError;
use crate::store::GeoPoint;
use validator::ValidationError;

pub const TITLE_MIN: usize = 5;
pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MIN: usize = 10;
pub const DESCRIPTION_MAX: usize = 2000;
pub const CATEGORY_MAX: usize = 50;

fn rejected(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

/// 3-30 characters of letters, digits, underscores and hyphens.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(3..=30).contains(&len) {
        return Err(rejected(
            "length",
            "Username must be between 3 and 30 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(rejected(
            "charset",
            "Username can only contain letters, numbers, underscores and hyphens",
        ));
    }
    Ok(())
}

/// At least 6 characters with one lowercase letter, one uppercase letter and one digit.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < 6 {
        return Err(rejected(
            "length",
            "Password must be at least 6 characters long",
        ));
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Err(rejected(
            "strength",
            "Password must contain at least one lowercase letter, one uppercase letter, and one number",
        ));
    }
    Ok(())
}

/// Length check on the trimmed value, pushing onto `errors` instead of failing fast.
pub fn check_trimmed_length(
    errors: &mut Vec<FieldError>,
    field: &str,
    label: &str,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = value.trim().chars().count();
    if len < min || len > max {
        errors.push(FieldError::new(
            field,
            format!("{label} must be between {min} and {max} characters"),
        ));
    }
}

/// Longitude in [-180, 180], latitude in [-90, 90], both finite.
pub fn check_coordinates(errors: &mut Vec<FieldError>, point: &GeoPoint) {
    if !point.longitude.is_finite() || !(-180.0..=180.0).contains(&point.longitude) {
        errors.push(FieldError::new(
            "location.coordinates",
            "Longitude must be between -180 and 180",
        ));
    }
    if !point.latitude.is_finite() || !(-90.0..=90.0).contains(&point.latitude) {
        errors.push(FieldError::new(
            "location.coordinates",
            "Latitude must be between -90 and 90",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("civic_hero-7").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("émile").is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password_strength("Secret1").is_ok());
        assert!(validate_password_strength("Se1").is_err());
        assert!(validate_password_strength("alllower1").is_err());
        assert!(validate_password_strength("ALLUPPER1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
    }

    #[test]
    fn trimmed_length_ignores_padding() {
        let mut errors = Vec::new();
        check_trimmed_length(&mut errors, "title", "Title", "   abcd   ", 5, 200);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "title");

        errors.clear();
        check_trimmed_length(&mut errors, "title", "Title", " abcde ", 5, 200);
        assert!(errors.is_empty());
    }

    #[test]
    fn coordinate_bounds() {
        let mut errors = Vec::new();
        check_coordinates(
            &mut errors,
            &GeoPoint {
                longitude: 200.0,
                latitude: -100.0,
            },
        );
        assert_eq!(errors.len(), 2);

        errors.clear();
        check_coordinates(
            &mut errors,
            &GeoPoint {
                longitude: 180.0,
                latitude: -90.0,
            },
        );
        assert!(errors.is_empty());

        check_coordinates(
            &mut errors,
            &GeoPoint {
                longitude: f64::NAN,
                latitude: 0.0,
            },
        );
        assert_eq!(errors.len(), 1);
    }
}
