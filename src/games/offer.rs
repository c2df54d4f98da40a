//! Banker offer calculation

use crate::games::types::Amount;

/// Offer = expected value of the unopened boxes (player's included) times the
/// house percentage, truncating at each integer division.
///
/// Always computed from scratch so rounding never accumulates across rounds.
pub fn calculate_offer(
    remaining_values: &[Amount],
    player_box_value: Amount,
    house_percentage: u8,
) -> Amount {
    let total: Amount = remaining_values
        .iter()
        .fold(player_box_value, |acc, v| acc.saturating_add(*v));
    let boxes = remaining_values.len() as Amount + 1;
    let expected_value = total / boxes;
    expected_value.saturating_mul(Amount::from(house_percentage)) / 100
}
