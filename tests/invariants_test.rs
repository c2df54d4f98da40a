//! Property tests for the game invariants.
//!
//! Every game is driven with arbitrary oracle values and arbitrary
//! accept/continue decisions; after each step the box partition, the
//! elimination schedule, the offer formula and house-fund conservation must
//! all hold.

use dealornot::config::EntryFeeMode;
use dealornot::games::{
    calculate_offer, eliminated_through, Amount, Fulfillment, Game, GameEngine, GameSettings,
    GameState, PlayerId, PrizeLadder, Randomness, VrfOracle, TOTAL_BOXES,
};
use proptest::prelude::*;

const FLOAT: Amount = 1_000_000_000_000_000_000_000_000;

fn arb_randomness() -> impl Strategy<Value = Randomness> {
    prop::array::uniform32(any::<u8>()).prop_map(Randomness)
}

fn arb_ladder() -> impl Strategy<Value = PrizeLadder> {
    prop_oneof![Just(PrizeLadder::Standard), Just(PrizeLadder::HighStakes)]
}

fn engine_for(ladder: PrizeLadder, house_percentage: u8) -> GameEngine {
    let settings = GameSettings {
        house_percentage,
        prize_ladder: ladder,
        entry_fee_mode: EntryFeeMode::Custom,
        entry_fee: 1,
        ..GameSettings::default()
    };
    let mut engine = GameEngine::new(settings, Box::new(VrfOracle::new_random(0)));
    engine
        .deposit_house_funds(&PlayerId::from("house"), FLOAT)
        .expect("Owner deposit should succeed");
    engine
}

fn check_game(game: &Game, house_percentage: u8) -> Result<(), TestCaseError> {
    prop_assert!(game.boxes_partitioned());
    prop_assert_eq!(
        game.eliminated_boxes.len(),
        eliminated_through(game.current_round)
    );
    prop_assert_eq!(game.is_active, !game.state.is_finished());

    if game.state == GameState::OfferMade {
        let values: Vec<Amount> = game
            .remaining_boxes
            .iter()
            .map(|&b| game.prize_pool[usize::from(b)])
            .collect();
        let expected = calculate_offer(
            &values,
            game.player_box_value().unwrap_or_default(),
            house_percentage,
        );
        prop_assert_eq!(game.current_offer(), Some(expected));
    } else {
        prop_assert_eq!(game.current_offer(), None);
    }
    Ok(())
}

fn deliver(engine: &mut GameEngine, game_id: u64, randomness: Randomness) {
    let request_id = engine
        .game(game_id)
        .unwrap()
        .pending_request
        .expect("Game should be waiting on the oracle");
    engine
        .fulfill(Fulfillment::new(request_id, randomness))
        .expect("Fulfillment should apply");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_game_invariants_hold(
        ladder in arb_ladder(),
        house_percentage in 1u8..=100,
        entry_fee in 1u128..=u64::MAX as u128,
        draws in prop::collection::vec(arb_randomness(), 7),
        accept_at in prop::option::of(1u8..=5),
    ) {
        let mut engine = engine_for(ladder, house_percentage);
        let player = PlayerId::from("player");
        let game_id = engine.start_game(&player, entry_fee, 0).unwrap();

        let game = engine.game(game_id).unwrap();
        prop_assert!(game.boxes_partitioned());
        prop_assert_eq!(game.remaining_boxes.len(), TOTAL_BOXES);

        deliver(&mut engine, game_id, draws[0]);
        check_game(engine.game(game_id).unwrap(), house_percentage)?;
        prop_assert_eq!(engine.game(game_id).unwrap().remaining_boxes.len(), 25);

        let mut draw = 1;
        loop {
            let game = engine.game(game_id).unwrap();
            if game.state.is_finished() {
                break;
            }
            if game.state == GameState::OfferMade && Some(game.current_round) == accept_at {
                let offer = game.current_offer().unwrap();
                prop_assert_eq!(engine.accept_deal(&player, game_id).unwrap(), offer);
                break;
            }
            engine.eliminate(&player, game_id, 0).unwrap();
            deliver(&mut engine, game_id, draws[draw]);
            draw += 1;
            check_game(engine.game(game_id).unwrap(), house_percentage)?;
        }

        let game = engine.game(game_id).unwrap();
        check_game(game, house_percentage)?;
        let payout = game.payout.expect("Finished game has a payout");
        match game.state {
            GameState::GameCompleted => {
                prop_assert_eq!(game.current_round, 6);
                prop_assert_eq!(Some(payout), game.player_box_value());
            }
            GameState::DealTaken => prop_assert_eq!(Some(game.current_round), accept_at),
            other => prop_assert!(false, "unexpected final state {}", other),
        }

        // Conservation: float + entry fee - payout
        prop_assert_eq!(engine.house_balance(), FLOAT + entry_fee - payout);
        prop_assert_eq!(engine.pending_requests(), 0);
    }

    #[test]
    fn prop_offer_never_exceeds_expected_value(
        values in prop::collection::vec(0u128..=1_000_000_000_000, 0..25),
        player_value in 0u128..=1_000_000_000_000,
        house_percentage in 0u8..=100,
    ) {
        let offer = calculate_offer(&values, player_value, house_percentage);
        let expected = calculate_offer(&values, player_value, 100);
        let max = values.iter().copied().chain([player_value]).max().unwrap_or(0);
        prop_assert!(offer <= expected);
        prop_assert!(expected <= max);
    }

    #[test]
    fn prop_prize_pool_is_sorted_and_scaled(
        ladder in arb_ladder(),
        entry_fee in 1u128..=u64::MAX as u128,
    ) {
        let pool = ladder.generate(entry_fee);
        prop_assert_eq!(pool.len(), TOTAL_BOXES);
        prop_assert!(pool.windows(2).all(|w| w[0] <= w[1]));
        let top = ladder.multipliers()[TOTAL_BOXES - 1] as u128;
        prop_assert_eq!(pool[TOTAL_BOXES - 1], entry_fee * top / 10_000);
    }
}
