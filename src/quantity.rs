// SPDX-License-Identifier: AGPL-3.0-or-later
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Unit conversion and quantity arithmetic.
//!
//! All stock is normalized to kilograms internally. Conversions and money
//! totals use [`Decimal`] with half-up rounding so stock and monetary values
//! never drift the way binary floats do.
//!
//! # Example
//!
//! ```
//! use harvest_market_rs::quantity::{self, Unit};
//! use rust_decimal_macros::dec;
//!
//! let kg = quantity::to_canonical(dec!(2), Unit::Sack).unwrap();
//! assert_eq!(kg, dec!(100.000));
//! assert_eq!(quantity::total_price(dec!(50), kg).unwrap(), dec!(5000.00));
//! ```

use crate::error::MarketError;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal places kept for canonical quantities.
pub const QUANTITY_DP: u32 = 3;

/// Decimal places kept for monetary totals.
pub const MONEY_DP: u32 = 2;

/// Measurement units accepted at the boundary.
///
/// Unknown unit strings are rejected when parsing, so every `Unit` value
/// carries a known conversion factor and minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Canonical unit, factor 1.
    #[serde(rename = "kg", alias = "kilogram")]
    Kilogram,
    /// Standard 50 kg sack for agricultural produce.
    Sack,
    /// Metric tonne, 1000 kg.
    #[serde(alias = "t")]
    Tonne,
}

impl Unit {
    /// Fixed conversion factor into kilograms.
    pub fn factor(self) -> Decimal {
        match self {
            Unit::Kilogram => dec!(1),
            Unit::Sack => dec!(50),
            Unit::Tonne => dec!(1000),
        }
    }

    /// Minimum publishable quantity, expressed in this unit.
    pub fn minimum(self) -> Decimal {
        match self {
            Unit::Kilogram => dec!(1.0),
            Unit::Sack => dec!(1.0),
            Unit::Tonne => dec!(0.1),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Unit::Kilogram => "kg",
            Unit::Sack => "sack",
            Unit::Tonne => "tonne",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Unit {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kg" | "kilogram" | "kilograms" => Ok(Unit::Kilogram),
            "sack" | "sacks" => Ok(Unit::Sack),
            "t" | "ton" | "tonne" | "tonnes" => Ok(Unit::Tonne),
            other => Err(MarketError::UnsupportedUnit(other.to_string())),
        }
    }
}

fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a quantity in `unit` to canonical kilograms, rounded to 3
/// decimal places half-up.
///
/// # Errors
///
/// [`MarketError::InvalidQuantity`] when `quantity <= 0`.
pub fn to_canonical(quantity: Decimal, unit: Unit) -> Result<Decimal, MarketError> {
    if quantity <= Decimal::ZERO {
        return Err(MarketError::InvalidQuantity);
    }
    Ok(round_quantity(quantity * unit.factor()))
}

/// Converts canonical kilograms back into `unit`, rounded to 3 decimal
/// places half-up.
///
/// # Errors
///
/// [`MarketError::InvalidQuantity`] when `quantity_kg <= 0`.
pub fn from_canonical(quantity_kg: Decimal, unit: Unit) -> Result<Decimal, MarketError> {
    if quantity_kg <= Decimal::ZERO {
        return Err(MarketError::InvalidQuantity);
    }
    Ok(round_quantity(quantity_kg / unit.factor()))
}

/// Whether `quantity` (expressed in `unit`) meets the per-unit minimum.
pub fn meets_minimum(quantity: Decimal, unit: Unit) -> bool {
    quantity >= unit.minimum()
}

/// Total price for `quantity_kg` at `price_per_kg`, rounded to 2 decimal
/// places half-up.
///
/// # Errors
///
/// [`MarketError::InvalidPrice`] when the price is non-positive and
/// [`MarketError::InvalidQuantity`] when the quantity is non-positive.
pub fn total_price(price_per_kg: Decimal, quantity_kg: Decimal) -> Result<Decimal, MarketError> {
    if price_per_kg <= Decimal::ZERO {
        return Err(MarketError::InvalidPrice);
    }
    if quantity_kg <= Decimal::ZERO {
        return Err(MarketError::InvalidQuantity);
    }
    Ok((price_per_kg * quantity_kg)
        .round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kilograms_convert_to_themselves() {
        assert_eq!(to_canonical(dec!(100), Unit::Kilogram).unwrap(), dec!(100.000));
    }

    #[test]
    fn sacks_convert_at_fifty_kilograms() {
        assert_eq!(to_canonical(dec!(2), Unit::Sack).unwrap(), dec!(100.000));
    }

    #[test]
    fn tonnes_convert_at_thousand_kilograms() {
        assert_eq!(to_canonical(dec!(1.5), Unit::Tonne).unwrap(), dec!(1500.000));
    }

    #[test]
    fn from_canonical_inverts_to_canonical() {
        let kg = to_canonical(dec!(3), Unit::Sack).unwrap();
        assert_eq!(from_canonical(kg, Unit::Sack).unwrap(), dec!(3.000));
    }

    #[test]
    fn conversion_rejects_non_positive_quantity() {
        assert_eq!(
            to_canonical(dec!(-10), Unit::Kilogram),
            Err(MarketError::InvalidQuantity)
        );
        assert_eq!(
            to_canonical(Decimal::ZERO, Unit::Sack),
            Err(MarketError::InvalidQuantity)
        );
        assert_eq!(
            from_canonical(Decimal::ZERO, Unit::Tonne),
            Err(MarketError::InvalidQuantity)
        );
    }

    #[test]
    fn unknown_unit_rejected_at_parse_time() {
        let err = "arroba".parse::<Unit>().unwrap_err();
        assert_eq!(err, MarketError::UnsupportedUnit("arroba".into()));
    }

    #[test]
    fn unit_parsing_accepts_aliases() {
        assert_eq!("KG".parse::<Unit>().unwrap(), Unit::Kilogram);
        assert_eq!(" sack ".parse::<Unit>().unwrap(), Unit::Sack);
        assert_eq!("t".parse::<Unit>().unwrap(), Unit::Tonne);
    }

    #[test]
    fn minimum_quantities_per_unit() {
        assert!(meets_minimum(dec!(1), Unit::Kilogram));
        assert!(meets_minimum(dec!(1), Unit::Sack));
        assert!(meets_minimum(dec!(0.1), Unit::Tonne));

        assert!(!meets_minimum(dec!(0.5), Unit::Sack));
        assert!(!meets_minimum(dec!(0.05), Unit::Tonne));
        assert!(!meets_minimum(Decimal::ZERO, Unit::Kilogram));
    }

    #[test]
    fn total_price_rounds_half_up_to_cents() {
        assert_eq!(total_price(dec!(50.5), dec!(2.3)).unwrap(), dec!(116.15));
        assert_eq!(total_price(dec!(1.0001), dec!(3)).unwrap(), dec!(3.00));
        // Midpoint rounds away from zero, not to even.
        assert_eq!(total_price(dec!(0.005), dec!(1)).unwrap(), dec!(0.01));
    }

    #[test]
    fn total_price_rejects_non_positive_operands() {
        assert_eq!(
            total_price(Decimal::ZERO, dec!(10)),
            Err(MarketError::InvalidPrice)
        );
        assert_eq!(
            total_price(dec!(-5), dec!(10)),
            Err(MarketError::InvalidPrice)
        );
        assert_eq!(
            total_price(dec!(50), Decimal::ZERO),
            Err(MarketError::InvalidQuantity)
        );
    }

    #[test]
    fn conversion_rounds_to_three_decimal_places() {
        // 1 kg / 50 = 0.02 sacks; 1.0005 kg stays at 3 dp half-up.
        assert_eq!(from_canonical(dec!(1), Unit::Sack).unwrap(), dec!(0.020));
        assert_eq!(
            to_canonical(dec!(1.00049), Unit::Kilogram).unwrap(),
            dec!(1.000)
        );
        assert_eq!(
            to_canonical(dec!(1.0005), Unit::Kilogram).unwrap(),
            dec!(1.001)
        );
    }
}
