use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bloodbank_core::{BloodGroup, ComponentType, DomainError, DomainResult};

/// Stock ledger key: one entry per blood group and component.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub blood_group: BloodGroup,
    pub component: ComponentType,
}

impl StockKey {
    pub fn new(blood_group: BloodGroup, component: ComponentType) -> Self {
        Self {
            blood_group,
            component,
        }
    }

    /// Key for the whole-blood entry of a group.
    pub fn whole_blood(blood_group: BloodGroup) -> Self {
        Self::new(blood_group, ComponentType::WHOLE_BLOOD)
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.blood_group, self.component)
    }
}

/// Units on hand for one [`StockKey`].
///
/// `units_available` never drops below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub key: StockKey,
    units_available: i64,
    last_updated: DateTime<Utc>,
}

impl StockEntry {
    pub fn new(key: StockKey, units_available: i64, last_updated: DateTime<Utc>) -> DomainResult<Self> {
        if units_available < 0 {
            return Err(DomainError::invariant(format!(
                "stock for {key} cannot be negative (got {units_available})"
            )));
        }
        Ok(Self {
            key,
            units_available,
            last_updated,
        })
    }

    pub fn units_available(&self) -> i64 {
        self.units_available
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn can_supply(&self, units: i64) -> bool {
        units > 0 && self.units_available >= units
    }

    /// Remove `units` from the entry, returning the remaining total.
    ///
    /// Leaves the entry untouched on error.
    pub fn withdraw(&mut self, units: i64, at: DateTime<Utc>) -> DomainResult<i64> {
        ensure_positive_units(units)?;
        if !self.can_supply(units) {
            return Err(DomainError::invariant(format!(
                "insufficient stock of {}: requested {units}, available {}",
                self.key, self.units_available
            )));
        }
        self.units_available -= units;
        self.last_updated = at;
        Ok(self.units_available)
    }

    /// Add `units` to the entry, returning the new total.
    pub fn restock(&mut self, units: i64, at: DateTime<Utc>) -> DomainResult<i64> {
        ensure_positive_units(units)?;
        let total = self
            .units_available
            .checked_add(units)
            .ok_or_else(|| DomainError::validation(format!("restocking {units} units overflows {}", self.key)))?;
        self.units_available = total;
        self.last_updated = at;
        Ok(total)
    }
}

/// Unit counts moved in or out of stock must be strictly positive.
pub fn ensure_positive_units(units: i64) -> DomainResult<i64> {
    if units <= 0 {
        return Err(DomainError::validation(format!(
            "units must be greater than zero (got {units})"
        )));
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn entry(units: i64) -> StockEntry {
        StockEntry::new(StockKey::whole_blood(BloodGroup::OPos), units, Utc::now()).unwrap()
    }

    #[test]
    fn negative_initial_stock_is_rejected() {
        let err = StockEntry::new(StockKey::whole_blood(BloodGroup::ANeg), -1, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn withdraw_reduces_stock_and_refreshes_timestamp() {
        let mut e = entry(10);
        let later = e.last_updated() + Duration::minutes(5);
        assert_eq!(e.withdraw(3, later).unwrap(), 7);
        assert_eq!(e.units_available(), 7);
        assert_eq!(e.last_updated(), later);
    }

    #[test]
    fn withdraw_beyond_stock_leaves_entry_unchanged() {
        let mut e = entry(5);
        let before = e.clone();
        let err = e.withdraw(8, Utc::now()).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) => assert!(msg.contains("requested 8, available 5")),
            other => panic!("expected invariant violation, got {other:?}"),
        }
        assert_eq!(e, before);
    }

    #[test]
    fn non_positive_quantities_are_validation_errors() {
        let mut e = entry(5);
        assert!(matches!(e.withdraw(0, Utc::now()), Err(DomainError::Validation(_))));
        assert!(matches!(e.restock(-2, Utc::now()), Err(DomainError::Validation(_))));
        assert_eq!(e.units_available(), 5);
    }

    #[test]
    fn restock_adds_units() {
        let mut e = entry(10);
        assert_eq!(e.restock(5, Utc::now()).unwrap(), 15);
    }

    #[test]
    fn restock_overflow_is_rejected() {
        let mut e = entry(i64::MAX - 1);
        assert!(e.restock(5, Utc::now()).is_err());
        assert_eq!(e.units_available(), i64::MAX - 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of withdrawals and restocks drives stock negative,
        /// and the final total equals the sum of the accepted movements.
        #[test]
        fn stock_never_goes_negative(
            start in 0i64..100,
            moves in prop::collection::vec(-50i64..50, 0..40)
        ) {
            let mut e = entry(start);
            let mut expected = start;
            for m in moves {
                let now = Utc::now();
                if m > 0 {
                    e.restock(m, now).unwrap();
                    expected += m;
                } else if m < 0 {
                    if e.withdraw(-m, now).is_ok() {
                        expected += m;
                    }
                }
                prop_assert!(e.units_available() >= 0);
            }
            prop_assert_eq!(e.units_available(), expected);
        }
    }
}
