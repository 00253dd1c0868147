//! `calculateFees`: the centralised fee schedule `processAutoTopUp`
//! charges against before calling Stripe (§4.5).
//!
//! Platform fee mirrors Stripe's published card-processing rate; the
//! card-country surcharge applies only to non-domestic cards, matching
//! Stripe's own international-card surcharge.

/// Platform processing rate, applied to the credit amount.
const PLATFORM_FEE_RATE: f64 = 0.029;
/// Fixed per-charge platform fee, in the transaction's currency unit.
const PLATFORM_FEE_FIXED: f64 = 0.30;
/// Additional surcharge applied when the card's country differs from the
/// organisation's billing country (here: anything but `"US"`).
const INTERNATIONAL_CARD_SURCHARGE_RATE: f64 = 0.015;

/// The domestic billing country; cards issued elsewhere incur the
/// international surcharge.
const DOMESTIC_CARD_COUNTRY: &str = "US";

/// Breakdown of one auto-top-up charge: `credit_amount` is what lands on
/// the organisation's balance once the webhook confirms payment;
/// `charge_amount` is what Stripe actually charges the card, sized to
/// cover the credits plus every fee.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeeBreakdown {
    pub credit_amount: f64,
    pub platform_fee: f64,
    pub card_surcharge: f64,
    pub charge_amount: f64,
}

/// Compute the fee breakdown for topping up `credit_amount` worth of
/// credits on a card issued in `card_country` (`None` is treated as
/// domestic, matching the conservative default when Stripe hasn't told
/// us the card's country yet).
#[must_use]
pub fn calculate_fees(credit_amount: f64, card_country: Option<&str>) -> FeeBreakdown {
    let platform_fee = credit_amount * PLATFORM_FEE_RATE + PLATFORM_FEE_FIXED;
    let is_international = card_country.is_some_and(|country| !country.eq_ignore_ascii_case(DOMESTIC_CARD_COUNTRY));
    let card_surcharge = if is_international {
        credit_amount * INTERNATIONAL_CARD_SURCHARGE_RATE
    } else {
        0.0
    };
    FeeBreakdown {
        credit_amount,
        platform_fee,
        card_surcharge,
        charge_amount: credit_amount + platform_fee + card_surcharge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domestic_card_has_no_surcharge() {
        let fees = calculate_fees(100.0, Some("US"));
        assert_eq!(fees.card_surcharge, 0.0);
        assert!((fees.platform_fee - 3.20).abs() < 1e-9);
        assert!((fees.charge_amount - 103.20).abs() < 1e-9);
    }

    #[test]
    fn missing_card_country_defaults_to_domestic() {
        let fees = calculate_fees(100.0, None);
        assert_eq!(fees.card_surcharge, 0.0);
    }

    #[test]
    fn international_card_adds_surcharge() {
        let fees = calculate_fees(100.0, Some("GB"));
        assert!((fees.card_surcharge - 1.50).abs() < 1e-9);
        assert!(fees.charge_amount > calculate_fees(100.0, Some("US")).charge_amount);
    }

    #[test]
    fn charge_amount_always_covers_credits_and_fees() {
        let fees = calculate_fees(250.0, Some("DE"));
        assert!((fees.charge_amount - (fees.credit_amount + fees.platform_fee + fees.card_surcharge)).abs() < 1e-9);
    }
}
