//! Referral status route.

use axum::{Json, extract::State};
use pawpantry_core::{CurrencyCode, Price, ReferralLevel, ReferralTiers};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::CurrentCustomer;
use crate::state::AppState;

/// Order total used for `example_commission`: 100.00 USD.
const EXAMPLE_ORDER_CENTS: i64 = 10_000;

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ReferralStatus {
    pub referral_count: u32,
    pub level: ReferralLevel,
    pub commission_rate: Decimal,
    /// Commission the current tier earns on a 100.00 USD order.
    pub example_commission: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_level: Option<NextLevel>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct NextLevel {
    pub level: ReferralLevel,
    pub min_referrals: u32,
}

impl ReferralStatus {
    fn from_count(tiers: &ReferralTiers, referral_count: u32) -> Self {
        let current = tiers.level_for(referral_count);
        Self {
            referral_count,
            level: current.level,
            commission_rate: current.commission_rate,
            example_commission: current
                .commission_for(Price::from_cents(EXAMPLE_ORDER_CENTS, CurrencyCode::USD)),
            next_level: tiers.next_after(referral_count).map(|tier| NextLevel {
                level: tier.level,
                min_referrals: tier.min_referrals,
            }),
        }
    }
}

/// Current referral tier for the signed-in customer.
///
/// GET /api/referral
#[instrument(skip(state, customer), fields(user_id = %customer.user_id))]
pub async fn status(
    State(state): State<AppState>,
    customer: CurrentCustomer,
) -> Result<Json<ReferralStatus>> {
    let count = state.backend().count_referrals(customer.user_id).await?;
    Ok(Json(ReferralStatus::from_count(state.referral_tiers(), count)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_includes_next_level() {
        let status = ReferralStatus::from_count(&ReferralTiers::default(), 6);
        assert_eq!(status.level, ReferralLevel::Silver);
        assert_eq!(
            status.next_level,
            Some(NextLevel {
                level: ReferralLevel::Gold,
                min_referrals: 15
            })
        );
    }

    #[test]
    fn test_top_tier_omits_next_level() {
        let status = ReferralStatus::from_count(&ReferralTiers::default(), 42);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["level"], "platinum");
        assert_eq!(json["commission_rate"], "0.125");
        assert_eq!(json["example_commission"]["amount"], "12.50");
        assert_eq!(json["example_commission"]["currency_code"], "USD");
        assert!(json.get("next_level").is_none());
    }
}
