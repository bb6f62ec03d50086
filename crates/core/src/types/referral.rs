//! Referral tiers and commission rates.
//!
//! Payouts are computed by the database; the storefront only needs to tell
//! a customer which tier their referral count puts them in and what the
//! next threshold is.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Price;

/// Named referral tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralLevel {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// One row of the tier table: reaching `min_referrals` unlocks `commission_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralTier {
    pub min_referrals: u32,
    pub level: ReferralLevel,
    /// Commission as a fraction of the order total (`0.05` = 5%).
    pub commission_rate: Decimal,
}

impl ReferralTier {
    /// Commission earned on an order total at this tier.
    #[must_use]
    pub fn commission_for(&self, order_total: Price) -> Price {
        order_total.scaled(self.commission_rate)
    }
}

/// Tier table sorted by ascending threshold.
///
/// The base tier (threshold zero) is held apart so every count maps to a
/// tier without a fallible lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralTiers {
    base: ReferralTier,
    higher: Vec<ReferralTier>,
}

impl ReferralTiers {
    /// Build a table from arbitrary rows. Rows are sorted by threshold.
    ///
    /// Returns `None` if the table is empty or no tier starts at zero, since
    /// every customer must land in some tier.
    #[must_use]
    pub fn new(mut tiers: Vec<ReferralTier>) -> Option<Self> {
        tiers.sort_by_key(|tier| tier.min_referrals);
        let mut rows = tiers.into_iter();
        let base = rows.next().filter(|tier| tier.min_referrals == 0)?;
        Some(Self {
            base,
            higher: rows.collect(),
        })
    }

    /// Tier for a referral count: the last row whose threshold is reached.
    #[must_use]
    pub fn level_for(&self, referrals: u32) -> &ReferralTier {
        self.higher
            .iter()
            .take_while(|tier| tier.min_referrals <= referrals)
            .last()
            .unwrap_or(&self.base)
    }

    /// The tier after the one `referrals` currently reaches, if any.
    #[must_use]
    pub fn next_after(&self, referrals: u32) -> Option<&ReferralTier> {
        self.higher
            .iter()
            .find(|tier| tier.min_referrals > referrals)
    }

    pub fn tiers(&self) -> impl Iterator<Item = &ReferralTier> {
        std::iter::once(&self.base).chain(&self.higher)
    }
}

impl Default for ReferralTiers {
    fn default() -> Self {
        Self {
            base: ReferralTier {
                min_referrals: 0,
                level: ReferralLevel::Bronze,
                commission_rate: Decimal::new(5, 2),
            },
            higher: vec![
                ReferralTier {
                    min_referrals: 5,
                    level: ReferralLevel::Silver,
                    commission_rate: Decimal::new(75, 3),
                },
                ReferralTier {
                    min_referrals: 15,
                    level: ReferralLevel::Gold,
                    commission_rate: Decimal::new(10, 2),
                },
                ReferralTier {
                    min_referrals: 30,
                    level: ReferralLevel::Platinum,
                    commission_rate: Decimal::new(125, 3),
                },
            ],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::CurrencyCode;

    #[test]
    fn test_level_for_thresholds() {
        let tiers = ReferralTiers::default();
        assert_eq!(tiers.level_for(0).level, ReferralLevel::Bronze);
        assert_eq!(tiers.level_for(4).level, ReferralLevel::Bronze);
        assert_eq!(tiers.level_for(5).level, ReferralLevel::Silver);
        assert_eq!(tiers.level_for(29).level, ReferralLevel::Gold);
        assert_eq!(tiers.level_for(30).level, ReferralLevel::Platinum);
        assert_eq!(tiers.level_for(u32::MAX).level, ReferralLevel::Platinum);
    }

    #[test]
    fn test_next_after() {
        let tiers = ReferralTiers::default();
        assert_eq!(tiers.next_after(3).unwrap().min_referrals, 5);
        assert_eq!(tiers.next_after(5).unwrap().level, ReferralLevel::Gold);
        assert!(tiers.next_after(30).is_none());
    }

    #[test]
    fn test_new_sorts_and_requires_zero_tier() {
        let gold = ReferralTier {
            min_referrals: 10,
            level: ReferralLevel::Gold,
            commission_rate: Decimal::new(1, 1),
        };
        let bronze = ReferralTier {
            min_referrals: 0,
            level: ReferralLevel::Bronze,
            commission_rate: Decimal::new(5, 2),
        };

        let tiers = ReferralTiers::new(vec![gold, bronze]).unwrap();
        assert_eq!(tiers.tiers().next().unwrap().level, ReferralLevel::Bronze);
        assert_eq!(tiers.level_for(12).level, ReferralLevel::Gold);

        assert!(ReferralTiers::new(vec![gold]).is_none());
        assert!(ReferralTiers::new(Vec::new()).is_none());
    }

    #[test]
    fn test_commission_for() {
        let tiers = ReferralTiers::default();
        let total = Price::from_cents(8000, CurrencyCode::USD);
        let commission = tiers.level_for(7).commission_for(total);
        assert_eq!(commission.amount, Decimal::new(600, 2));
    }
}
