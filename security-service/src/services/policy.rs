//! Password policy validation and strength scoring.

use serde::Serialize;
use std::fmt;

const COMMON_SEQUENCES: &[&str] = &[
    "123456", "234567", "345678", "456789", "654321", "987654", "abcdef", "qwerty", "asdfgh",
    "zxcvbn",
];

const COMMON_WORDS: &[&str] = &[
    "password", "admin", "letmein", "welcome", "monkey", "dragon", "master", "iloveyou",
    "secret", "login", "senha", "igreja",
];

/// A single password rule that was not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyViolation {
    TooShort,
    TooLong,
    MissingLetter,
    MissingDigit,
    MissingSpecial,
    MissingUppercase,
    MissingLowercase,
    SurroundingWhitespace,
    RepeatedCharacters,
    CommonSequence,
    CommonWord,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyViolation::TooShort => write!(
                f,
                "Password must be at least {} characters",
                PolicyService::MIN_LENGTH
            ),
            PolicyViolation::TooLong => write!(
                f,
                "Password must be at most {} characters",
                PolicyService::MAX_LENGTH
            ),
            PolicyViolation::MissingLetter => {
                write!(f, "Password must contain at least one letter")
            }
            PolicyViolation::MissingDigit => write!(f, "Password must contain at least one number"),
            PolicyViolation::MissingSpecial => {
                write!(f, "Password must contain at least one special character")
            }
            PolicyViolation::MissingUppercase => write!(
                f,
                "Passwords of {} or more characters must contain an uppercase letter",
                PolicyService::MIXED_CASE_LENGTH
            ),
            PolicyViolation::MissingLowercase => write!(
                f,
                "Passwords of {} or more characters must contain a lowercase letter",
                PolicyService::MIXED_CASE_LENGTH
            ),
            PolicyViolation::SurroundingWhitespace => {
                write!(f, "Password must not start or end with whitespace")
            }
            PolicyViolation::RepeatedCharacters => {
                write!(f, "Password must not repeat a character 3 or more times in a row")
            }
            PolicyViolation::CommonSequence => {
                write!(f, "Password must not contain common sequences such as 123456 or qwerty")
            }
            PolicyViolation::CommonWord => {
                write!(f, "Password must not contain common words such as password or admin")
            }
        }
    }
}

impl std::error::Error for PolicyViolation {}

/// Outcome of [`PolicyService::validate_password`]; lists every violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyReport {
    pub valid: bool,
    pub violations: Vec<PolicyViolation>,
}

impl PolicyReport {
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthLevel {
    Weak,
    Fair,
    Good,
    Strong,
}

impl StrengthLevel {
    fn from_score(score: u8) -> Self {
        match score {
            0..=29 => StrengthLevel::Weak,
            30..=59 => StrengthLevel::Fair,
            60..=79 => StrengthLevel::Good,
            _ => StrengthLevel::Strong,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrengthReport {
    pub score: u8,
    pub level: StrengthLevel,
}

#[derive(Debug, Default, Clone, Copy)]
struct CharClasses {
    lower: bool,
    upper: bool,
    digit: bool,
    special: bool,
}

impl CharClasses {
    fn of(password: &str) -> Self {
        let mut classes = CharClasses::default();
        for c in password.chars() {
            if c.is_lowercase() {
                classes.lower = true;
            } else if c.is_uppercase() {
                classes.upper = true;
            } else if c.is_ascii_digit() {
                classes.digit = true;
            } else if !c.is_alphanumeric() && !c.is_whitespace() {
                classes.special = true;
            }
        }
        classes
    }

    fn count(&self) -> u8 {
        [self.lower, self.upper, self.digit, self.special]
            .iter()
            .filter(|present| **present)
            .count() as u8
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WeakPatterns {
    repeated: bool,
    sequence: bool,
    word: bool,
}

impl WeakPatterns {
    fn of(password: &str) -> Self {
        let lower = password.to_lowercase();
        WeakPatterns {
            repeated: has_repeated_run(password, 3),
            sequence: COMMON_SEQUENCES.iter().any(|s| lower.contains(s)),
            word: COMMON_WORDS.iter().any(|w| lower.contains(w)),
        }
    }

    fn count(&self) -> i32 {
        [self.repeated, self.sequence, self.word]
            .iter()
            .filter(|present| **present)
            .count() as i32
    }
}

fn has_repeated_run(password: &str, run: usize) -> bool {
    let mut previous = None;
    let mut length = 0;
    for c in password.chars() {
        if Some(c) == previous {
            length += 1;
        } else {
            previous = Some(c);
            length = 1;
        }
        if length >= run {
            return true;
        }
    }
    false
}

/// Password policy and strength rules.
#[derive(Debug, Clone)]
pub struct PolicyService;

impl PolicyService {
    pub const MIN_LENGTH: usize = 8;
    pub const MAX_LENGTH: usize = 128;
    /// From this length on, both cases are required.
    pub const MIXED_CASE_LENGTH: usize = 12;

    /// Check a password against every rule and report all violations.
    pub fn validate_password(password: &str) -> PolicyReport {
        let length = password.chars().count();
        let classes = CharClasses::of(password);
        let weak = WeakPatterns::of(password);
        let mut violations = Vec::new();

        if length < Self::MIN_LENGTH {
            violations.push(PolicyViolation::TooShort);
        }
        if length > Self::MAX_LENGTH {
            violations.push(PolicyViolation::TooLong);
        }
        if !password.chars().any(char::is_alphabetic) {
            violations.push(PolicyViolation::MissingLetter);
        }
        if !classes.digit {
            violations.push(PolicyViolation::MissingDigit);
        }
        if !classes.special {
            violations.push(PolicyViolation::MissingSpecial);
        }
        if length >= Self::MIXED_CASE_LENGTH {
            if !classes.upper {
                violations.push(PolicyViolation::MissingUppercase);
            }
            if !classes.lower {
                violations.push(PolicyViolation::MissingLowercase);
            }
        }
        if password.trim() != password {
            violations.push(PolicyViolation::SurroundingWhitespace);
        }
        if weak.repeated {
            violations.push(PolicyViolation::RepeatedCharacters);
        }
        if weak.sequence {
            violations.push(PolicyViolation::CommonSequence);
        }
        if weak.word {
            violations.push(PolicyViolation::CommonWord);
        }

        PolicyReport {
            valid: violations.is_empty(),
            violations,
        }
    }

    /// Score a password from 0 to 100.
    pub fn strength(password: &str) -> StrengthReport {
        let length = password.chars().count();
        let classes = CharClasses::of(password);
        let weak = WeakPatterns::of(password);

        let mut score: i32 = 0;
        if length >= 8 {
            score += 20;
        }
        if length >= 12 {
            score += 10;
        }
        if length >= 16 {
            score += 10;
        }

        let class_count = classes.count();
        score += 10 * i32::from(class_count);
        score += match class_count {
            4 => 20,
            3 => 10,
            _ => 0,
        };

        score -= 20 * weak.count();

        let score = score.clamp(0, 100) as u8;
        StrengthReport {
            score,
            level: StrengthLevel::from_score(score),
        }
    }
}
