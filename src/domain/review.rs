use crate::error::AppError;

pub const MAX_COMMENT_CHARS: usize = 1000;

pub fn validate_rating(rating: i32) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::Validation(
            "Rating must be an integer between 1 and 5".into(),
        ));
    }
    Ok(())
}

/// Trims the comment and drops it when blank.
pub fn normalize_comment(comment: Option<String>) -> Result<Option<String>, AppError> {
    let Some(comment) = comment else {
        return Ok(None);
    };
    let trimmed = comment.trim();
    if trimmed.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment must be under {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

/// Average rounded to two decimals, with the review count.
pub fn rating_summary(ratings: &[i32]) -> (f64, i32) {
    if ratings.is_empty() {
        return (0.0, 0);
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let avg = sum as f64 / ratings.len() as f64;
    ((avg * 100.0).round() / 100.0, ratings.len() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_between_one_and_five() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }

    #[test]
    fn comment_is_trimmed_and_bounded() {
        assert_eq!(
            normalize_comment(Some("  great camera  ".into())).expect("ok"),
            Some("great camera".to_string())
        );
        assert_eq!(normalize_comment(Some("   ".into())).expect("ok"), None);
        assert!(normalize_comment(Some("x".repeat(MAX_COMMENT_CHARS + 1))).is_err());
    }

    #[test]
    fn summary_rounds_to_two_decimals() {
        assert_eq!(rating_summary(&[5, 4, 4]), (4.33, 3));
        assert_eq!(rating_summary(&[]), (0.0, 0));
    }
}
