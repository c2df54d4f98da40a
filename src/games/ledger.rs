//! House funds accounting
//!
//! All balance changes go through this module so the never-negative
//! invariant lives in one place.

use crate::errors::{AuthorizationError, DealResult, ResourceError, ValidationError};
use crate::games::types::{Amount, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Shared balance backing every game's payouts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HouseLedger {
    owner: PlayerId,
    balance: Amount,
    /// Monotonic audit counters
    total_in: Amount,
    total_out: Amount,
}

impl HouseLedger {
    pub fn new(owner: PlayerId) -> Self {
        Self {
            owner,
            balance: 0,
            total_in: 0,
            total_out: 0,
        }
    }

    pub fn owner(&self) -> &PlayerId {
        &self.owner
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn total_in(&self) -> Amount {
        self.total_in
    }

    pub fn total_out(&self) -> Amount {
        self.total_out
    }

    fn ensure_owner(&self, caller: &PlayerId) -> DealResult<()> {
        if caller != &self.owner {
            return Err(AuthorizationError::NotOwner.into());
        }
        Ok(())
    }

    /// Owner top-up
    pub fn deposit(&mut self, caller: &PlayerId, amount: Amount) -> DealResult<Amount> {
        self.ensure_owner(caller)?;
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        self.credit(amount);
        info!(amount = %amount, balance = %self.balance, "House funds deposited");
        Ok(self.balance)
    }

    /// Owner withdrawal; asking for more than the balance is a bad request, not a shortfall
    pub fn withdraw(&mut self, caller: &PlayerId, amount: Amount) -> DealResult<Amount> {
        self.ensure_owner(caller)?;
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        if amount > self.balance {
            return Err(ValidationError::WithdrawExceedsBalance {
                requested: amount,
                available: self.balance,
            }
            .into());
        }
        self.debit(amount)?;
        info!(amount = %amount, balance = %self.balance, "House funds withdrawn");
        Ok(self.balance)
    }

    /// Entry fees flow in here
    pub(crate) fn credit(&mut self, amount: Amount) {
        self.balance = self.balance.saturating_add(amount);
        self.total_in = self.total_in.saturating_add(amount);
        debug!(amount = %amount, balance = %self.balance, "Ledger credit");
    }

    /// Payouts flow out here; refused if it would go negative
    pub(crate) fn debit(&mut self, amount: Amount) -> DealResult<()> {
        self.ensure_covers(amount)?;
        self.balance -= amount;
        self.total_out = self.total_out.saturating_add(amount);
        debug!(amount = %amount, balance = %self.balance, "Ledger debit");
        Ok(())
    }

    /// Check a debit would succeed without performing it
    pub fn ensure_covers(&self, amount: Amount) -> DealResult<()> {
        if self.balance < amount {
            return Err(ResourceError::HouseInsufficientFunds {
                required: amount,
                available: self.balance,
            }
            .into());
        }
        Ok(())
    }
}

/// Pre-authorized spending for token-denominated deployments
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceBook {
    allowances: HashMap<PlayerId, Amount>,
}

impl AllowanceBook {
    /// Replace the player's allowance, ERC-20 style
    pub fn approve(&mut self, player: &PlayerId, amount: Amount) {
        self.allowances.insert(player.clone(), amount);
    }

    pub fn allowance(&self, player: &PlayerId) -> Amount {
        self.allowances.get(player).copied().unwrap_or(0)
    }

    pub(crate) fn ensure_covers(&self, player: &PlayerId, amount: Amount) -> DealResult<()> {
        let available = self.allowance(player);
        if available < amount {
            return Err(ValidationError::InsufficientAllowance {
                required: amount,
                available,
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn consume(&mut self, player: &PlayerId, amount: Amount) -> DealResult<()> {
        self.ensure_covers(player, amount)?;
        if let Some(allowance) = self.allowances.get_mut(player) {
            *allowance -= amount;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DealError;

    fn owner() -> PlayerId {
        PlayerId::from("house")
    }

    #[test]
    fn test_owner_deposit_and_withdraw() {
        let mut ledger = HouseLedger::new(owner());
        assert_eq!(ledger.deposit(&owner(), 500).unwrap(), 500);
        assert_eq!(ledger.withdraw(&owner(), 200).unwrap(), 300);
        assert_eq!(ledger.total_in(), 500);
        assert_eq!(ledger.total_out(), 200);
    }

    #[test]
    fn test_non_owner_rejected() {
        let mut ledger = HouseLedger::new(owner());
        let stranger = PlayerId::from("mallory");
        assert_eq!(
            ledger.deposit(&stranger, 10),
            Err(DealError::Authorization(AuthorizationError::NotOwner))
        );
        assert_eq!(
            ledger.withdraw(&stranger, 10),
            Err(DealError::Authorization(AuthorizationError::NotOwner))
        );
        assert_eq!(ledger.balance(), 0);
    }

    #[test]
    fn test_withdraw_cannot_underflow() {
        let mut ledger = HouseLedger::new(owner());
        ledger.deposit(&owner(), 100).unwrap();
        assert_eq!(
            ledger.withdraw(&owner(), 101),
            Err(DealError::Validation(ValidationError::WithdrawExceedsBalance {
                requested: 101,
                available: 100,
            }))
        );
        assert_eq!(ledger.balance(), 100);
        assert_eq!(ledger.total_out(), 0);
    }

    #[test]
    fn test_debit_refused_below_zero() {
        let mut ledger = HouseLedger::new(owner());
        ledger.credit(50);
        assert!(ledger.debit(51).is_err());
        assert!(ledger.debit(50).is_ok());
        assert_eq!(ledger.balance(), 0);
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let mut ledger = HouseLedger::new(owner());
        assert_eq!(
            ledger.deposit(&owner(), 0),
            Err(DealError::Validation(ValidationError::ZeroAmount))
        );
    }

    #[test]
    fn test_allowance_consumption() {
        let mut book = AllowanceBook::default();
        let alice = PlayerId::from("alice");
        book.approve(&alice, 300);
        assert!(book.consume(&alice, 400).is_err());
        book.consume(&alice, 100).unwrap();
        assert_eq!(book.allowance(&alice), 200);
        assert_eq!(book.allowance(&PlayerId::from("bob")), 0);
    }
}
