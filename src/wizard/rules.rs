//! Declarative field rules for the User, Address and Payment entities.
//!
//! Each entity owns a static table of `(field, [rule...])`. Rules on a field
//! run in declaration order and every failing rule contributes its message,
//! so a single field can carry several violations. Format rules (patterns,
//! e-mail shape, expiration) skip empty values and leave blankness to
//! `NotBlank`; length rules always apply.
//!
//! Both the per-step validator and the final submission read these tables,
//! so the client-perceived and server-enforced rules cannot drift.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::config::ValidationPolicy;

use super::model::{Field, SubscriptionType, ValidationResult, WizardData};

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?\d+$").expect("phone pattern compiles"));

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("digits pattern compiles"));

// HTML5 e-mail grammar.
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("email pattern compiles")
});

/// Named regular expressions usable from a rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Digits with an optional leading `+`.
    PhoneNumber,
    DigitsOnly,
}

impl Pattern {
    fn regex(self) -> &'static Regex {
        match self {
            Pattern::PhoneNumber => &PHONE,
            Pattern::DigitsOnly => &DIGITS,
        }
    }
}

/// What a rule checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// Value is non-empty.
    NotBlank,
    /// `NotBlank`, enforced only when the policy asks for it.
    NotBlankByPolicy,
    /// At least this many characters.
    MinLength(usize),
    /// At most this many characters.
    MaxLength(usize),
    Pattern(Pattern),
    Email,
    /// Decodes to a `SubscriptionType`.
    KnownSubscription,
    /// `MM/YY` whose last calendar day is not before today. The rule
    /// message covers malformed input; range and expiry carry their own.
    Expiration {
        month_message: &'static str,
        expired_message: &'static str,
    },
}

/// A single check and the violation it reports.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub check: Check,
    pub message: &'static str,
}

const fn rule(check: Check, message: &'static str) -> Rule {
    Rule { check, message }
}

/// All rules attached to one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldRules {
    pub field: Field,
    pub rules: &'static [Rule],
}

/// The persisted entities whose fields the wizard collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Address,
    Payment,
}

static USER_RULES: &[FieldRules] = &[
    FieldRules {
        field: Field::Name,
        rules: &[
            rule(Check::NotBlank, "Name cannot be empty."),
            rule(Check::MaxLength(255), "Name cannot exceed 255 characters."),
        ],
    },
    FieldRules {
        field: Field::Email,
        rules: &[
            rule(Check::NotBlank, "Email cannot be empty."),
            rule(Check::Email, "Please enter a valid email address."),
            rule(Check::MaxLength(255), "Email cannot exceed 255 characters."),
        ],
    },
    FieldRules {
        field: Field::Phone,
        rules: &[
            rule(Check::NotBlank, "Phone cannot be empty."),
            rule(
                Check::Pattern(Pattern::PhoneNumber),
                "Please enter a valid phone number with digits or an optional leading plus sign.",
            ),
            rule(Check::MinLength(10), "Phone number must be at least 10 characters long."),
            rule(Check::MaxLength(15), "Phone number cannot exceed 15 characters."),
        ],
    },
    FieldRules {
        field: Field::SubscriptionType,
        rules: &[
            rule(Check::NotBlank, "Subscription Type cannot be empty."),
            rule(Check::KnownSubscription, "Invalid subscription type."),
        ],
    },
];

static ADDRESS_RULES: &[FieldRules] = &[
    FieldRules {
        field: Field::AddressLine1,
        rules: &[
            rule(Check::NotBlank, "Address Line 1 is required."),
            rule(Check::MinLength(5), "Address Line 1 must be at least 5 characters long."),
            rule(Check::MaxLength(150), "Address Line 1 cannot exceed 150 characters."),
        ],
    },
    FieldRules {
        field: Field::AddressLine2,
        rules: &[
            rule(Check::NotBlankByPolicy, "Address Line 2 is required."),
            rule(Check::MaxLength(150), "Address Line 2 cannot exceed 150 characters."),
        ],
    },
    FieldRules {
        field: Field::City,
        rules: &[
            rule(Check::NotBlank, "City is required."),
            rule(Check::MinLength(2), "City must be at least 2 characters long."),
            rule(Check::MaxLength(100), "City cannot exceed 100 characters."),
        ],
    },
    FieldRules {
        field: Field::PostalCode,
        rules: &[
            rule(Check::NotBlank, "Postal Code is required."),
            rule(Check::MinLength(4), "Postal Code must be at least 4 characters long."),
            rule(Check::MaxLength(10), "Postal Code cannot exceed 10 characters."),
        ],
    },
    FieldRules {
        field: Field::State,
        rules: &[
            rule(Check::NotBlank, "State is required."),
            rule(Check::MinLength(2), "State must be at least 2 characters long."),
            rule(Check::MaxLength(100), "State cannot exceed 100 characters."),
        ],
    },
    FieldRules {
        field: Field::Country,
        rules: &[
            rule(Check::NotBlank, "Country is required."),
            rule(Check::MinLength(2), "Country must be at least 2 characters long."),
            rule(Check::MaxLength(100), "Country cannot exceed 100 characters."),
        ],
    },
];

static PAYMENT_RULES: &[FieldRules] = &[
    FieldRules {
        field: Field::CreditCardNumber,
        rules: &[
            rule(Check::NotBlank, "Credit card number is required."),
            rule(Check::MinLength(16), "Credit card number must be exactly 16 digits."),
            rule(Check::MaxLength(16), "Credit card number must be exactly 16 digits."),
            rule(
                Check::Pattern(Pattern::DigitsOnly),
                "Credit card number must contain only digits.",
            ),
        ],
    },
    FieldRules {
        field: Field::ExpirationDate,
        rules: &[
            rule(Check::NotBlank, "Expiration date is required."),
            rule(
                Check::Expiration {
                    month_message: "Month must be between 01 and 12.",
                    expired_message: "Expiration date must be in the future.",
                },
                "Invalid expiration date format. Use MM/YY.",
            ),
        ],
    },
    FieldRules {
        field: Field::Cvv,
        rules: &[
            rule(Check::NotBlank, "CVV is required."),
            rule(Check::MinLength(3), "CVV must be either 3 or 4 digits."),
            rule(Check::MaxLength(4), "CVV must be either 3 or 4 digits."),
            rule(Check::Pattern(Pattern::DigitsOnly), "CVV must contain only digits."),
        ],
    },
];

impl Entity {
    /// The rule table for this entity.
    pub fn rules(self) -> &'static [FieldRules] {
        match self {
            Entity::User => USER_RULES,
            Entity::Address => ADDRESS_RULES,
            Entity::Payment => PAYMENT_RULES,
        }
    }
}

/// Applies the rule tables to wizard data.
///
/// Holds only the policy switches and the date used for expiry checks, so
/// the same input always produces the same result.
#[derive(Debug, Clone, Copy)]
pub struct FieldValidator {
    policy: ValidationPolicy,
    today: NaiveDate,
}

impl FieldValidator {
    pub fn new(policy: ValidationPolicy, today: NaiveDate) -> Self {
        Self { policy, today }
    }

    /// Validate every field of `entity` in `data`.
    pub fn validate(&self, entity: Entity, data: &WizardData) -> ValidationResult {
        let mut result = ValidationResult::new();
        for field_rules in entity.rules() {
            let value = data.get(field_rules.field);
            for rule in field_rules.rules {
                if let Some(message) = self.violation(rule, value) {
                    result.add(field_rules.field, message);
                }
            }
        }
        result
    }

    fn violation(&self, rule: &Rule, value: &str) -> Option<&'static str> {
        let failed = match rule.check {
            Check::NotBlank => is_blank(value),
            Check::NotBlankByPolicy => self.policy.address_line2_required && is_blank(value),
            Check::MinLength(min) => value.chars().count() < min,
            Check::MaxLength(max) => value.chars().count() > max,
            Check::Pattern(pattern) => !value.is_empty() && !pattern.regex().is_match(value),
            Check::Email => !value.is_empty() && !EMAIL.is_match(value),
            Check::KnownSubscription => {
                !value.is_empty() && value.parse::<SubscriptionType>().is_err()
            }
            Check::Expiration {
                month_message,
                expired_message,
            } => {
                if value.is_empty() {
                    return None;
                }
                return match check_expiration(value, self.today) {
                    Ok(()) => None,
                    Err(ExpirationError::Format) => Some(rule.message),
                    Err(ExpirationError::Month) => Some(month_message),
                    Err(ExpirationError::Expired) => Some(expired_message),
                };
            }
        };
        failed.then_some(rule.message)
    }
}

fn is_blank(value: &str) -> bool {
    value.is_empty()
}

/// Why an expiration value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationError {
    Format,
    Month,
    Expired,
}

/// Check a card expiration written as `MM/YY`.
///
/// The card stays valid through the last calendar day of its month, so the
/// value is rejected only once that day is strictly before `today`.
pub fn check_expiration(value: &str, today: NaiveDate) -> Result<(), ExpirationError> {
    let (month, year) = value.split_once('/').ok_or(ExpirationError::Format)?;
    if !is_two_digits(month) || !is_two_digits(year) {
        return Err(ExpirationError::Format);
    }
    let month: u32 = month.parse().map_err(|_| ExpirationError::Format)?;
    let year: i32 = year.parse().map_err(|_| ExpirationError::Format)?;

    if !(1..=12).contains(&month) {
        return Err(ExpirationError::Month);
    }

    let last_day = last_day_of_month(2000 + year, month).ok_or(ExpirationError::Format)?;
    if last_day < today {
        return Err(ExpirationError::Expired);
    }
    Ok(())
}

fn is_two_digits(s: &str) -> bool {
    s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Last calendar day of `month` in `year`.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_of_next.pred_opt()
}
