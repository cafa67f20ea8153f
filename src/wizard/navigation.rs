//! Step adjacency, expressed as a lookup table per subscription category.
//!
//! With a free subscription the payment step is unlinked: identity → address
//! → review and back. Any other category (premium, or nothing decodable yet)
//! walks all four steps.

use super::model::{Step, SubscriptionType};

/// Neighbors of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLinks {
    pub next: Option<Step>,
    pub prev: Option<Step>,
}

const fn links(next: Option<Step>, prev: Option<Step>) -> StepLinks {
    StepLinks { next, prev }
}

/// Indexed by `Step::index()`.
static LINEAR: [StepLinks; 4] = [
    links(Some(Step::Address), None),
    links(Some(Step::Payment), Some(Step::Identity)),
    links(Some(Step::Review), Some(Step::Address)),
    links(None, Some(Step::Payment)),
];

static SKIP_PAYMENT: [StepLinks; 4] = [
    links(Some(Step::Address), None),
    links(Some(Step::Review), Some(Step::Identity)),
    links(Some(Step::Review), Some(Step::Address)),
    links(None, Some(Step::Address)),
];

/// The adjacency table that applies to `subscription`.
pub fn step_table(subscription: Option<SubscriptionType>) -> &'static [StepLinks; 4] {
    match subscription {
        Some(SubscriptionType::Free) => &SKIP_PAYMENT,
        Some(SubscriptionType::Premium) | None => &LINEAR,
    }
}

/// Step after `from`, or `None` at the last step.
pub fn next_step(from: Step, subscription: Option<SubscriptionType>) -> Option<Step> {
    step_table(subscription)[from.index()].next
}

/// Step before `from`, or `None` at the first step.
pub fn prev_step(from: Step, subscription: Option<SubscriptionType>) -> Option<Step> {
    step_table(subscription)[from.index()].prev
}

/// Whether `step` is part of the flow for `subscription`.
pub fn is_active(step: Step, subscription: Option<SubscriptionType>) -> bool {
    !(step == Step::Payment && subscription == Some(SubscriptionType::Free))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_SUBSCRIPTIONS: [Option<SubscriptionType>; 3] = [
        None,
        Some(SubscriptionType::Free),
        Some(SubscriptionType::Premium),
    ];

    #[test]
    fn premium_walks_every_step() {
        let premium = Some(SubscriptionType::Premium);
        let mut seen = vec![Step::FIRST];
        let mut current = Step::FIRST;
        while let Some(next) = next_step(current, premium) {
            seen.push(next);
            current = next;
        }
        assert_eq!(seen, Step::ALL.to_vec());
    }

    #[test]
    fn free_never_lands_on_payment() {
        let free = Some(SubscriptionType::Free);
        for step in Step::ALL {
            assert_ne!(next_step(step, free), Some(Step::Payment));
            assert_ne!(prev_step(step, free), Some(Step::Payment));
        }
        assert_eq!(next_step(Step::Address, free), Some(Step::Review));
        assert_eq!(prev_step(Step::Review, free), Some(Step::Address));
    }

    #[test]
    fn ends_have_no_neighbor() {
        for subscription in ALL_SUBSCRIPTIONS {
            assert_eq!(prev_step(Step::FIRST, subscription), None);
            assert_eq!(next_step(Step::LAST, subscription), None);
        }
    }

    #[test]
    fn links_are_symmetric_over_active_steps() {
        for subscription in ALL_SUBSCRIPTIONS {
            for step in Step::ALL.into_iter().filter(|s| is_active(*s, subscription)) {
                if let Some(next) = next_step(step, subscription) {
                    assert_eq!(prev_step(next, subscription), Some(step));
                }
            }
        }
    }

    #[test]
    fn payment_inactive_only_for_free() {
        assert!(!is_active(Step::Payment, Some(SubscriptionType::Free)));
        assert!(is_active(Step::Payment, Some(SubscriptionType::Premium)));
        assert!(is_active(Step::Payment, None));
        assert!(is_active(Step::Review, Some(SubscriptionType::Free)));
    }
}
