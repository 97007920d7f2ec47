//! Cheap local checks run before any cache read or upstream call.

const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;
/// A run this long of one digit is never a real subscriber number.
const MAX_REPEAT_RUN: usize = 9;
/// 15-digit identifiers are group ids, not contacts.
const GROUP_ID_DIGITS: usize = 15;

/// Why a phone number was refused without a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneRejection {
    TooShort,
    TooLong,
    RepeatedDigits,
    GroupIdentifier,
}

impl PhoneRejection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::RepeatedDigits => "repeated_digits",
            Self::GroupIdentifier => "group_identifier",
        }
    }
}

impl std::fmt::Display for PhoneRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digit-sanitize `raw` and check it against the known-bad patterns.
/// Returns the sanitized number.
pub fn validate_phone(raw: &str) -> Result<String, PhoneRejection> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.len() < MIN_DIGITS {
        return Err(PhoneRejection::TooShort);
    }
    if digits.len() == GROUP_ID_DIGITS {
        return Err(PhoneRejection::GroupIdentifier);
    }
    if digits.len() > MAX_DIGITS {
        return Err(PhoneRejection::TooLong);
    }
    if longest_run(&digits) >= MAX_REPEAT_RUN.min(digits.len()) {
        return Err(PhoneRejection::RepeatedDigits);
    }
    Ok(digits)
}

fn longest_run(digits: &str) -> usize {
    let bytes = digits.as_bytes();
    let mut best = 0;
    let mut run = 0;
    for (i, b) in bytes.iter().enumerate() {
        run = if i > 0 && bytes[i - 1] == *b {
            run + 1
        } else {
            1
        };
        best = best.max(run);
    }
    best
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_numbers() {
        assert_eq!(validate_phone("5511987654321").unwrap(), "5511987654321");
        assert_eq!(validate_phone("+55 (11) 98765-4321").unwrap(), "5511987654321");
        assert_eq!(validate_phone("14155552671").unwrap(), "14155552671");
    }

    #[test]
    fn length_band() {
        assert_eq!(validate_phone("1234567"), Err(PhoneRejection::TooShort));
        assert_eq!(validate_phone("12345678").unwrap(), "12345678");
        assert_eq!(validate_phone("1234567890123456"), Err(PhoneRejection::TooLong));
    }

    #[test]
    fn fifteen_digits_is_a_group_id() {
        assert_eq!(
            validate_phone("120363025246125"),
            Err(PhoneRejection::GroupIdentifier)
        );
    }

    #[test]
    fn repeated_digits_are_refused() {
        assert_eq!(validate_phone("11111111"), Err(PhoneRejection::RepeatedDigits));
        assert_eq!(
            validate_phone("55999999999"),
            Err(PhoneRejection::RepeatedDigits)
        );
        // Eight nines in a row is still a plausible number.
        assert!(validate_phone("5511999999992").is_ok());
    }
}
