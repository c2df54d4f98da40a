//! End-to-end game flows against the public engine API.

use dealornot::errors::{AuthorizationError, DealError, OracleError, ResourceError, StateError};
use dealornot::games::{
    Amount, Fulfillment, GameEngine, GameEvent, GameSettings, GameState, InstantOracle, PlayerId,
    Randomness, VrfOracle, TOTAL_BOXES,
};

const ENTRY_FEE: Amount = 100;

fn house() -> PlayerId {
    PlayerId::from("house")
}

fn alice() -> PlayerId {
    PlayerId::from("alice")
}

fn settings(entry_fee: Amount) -> GameSettings {
    GameSettings {
        entry_fee,
        ..GameSettings::default()
    }
}

fn instant_engine(seed: u64) -> GameEngine {
    let mut engine = GameEngine::new(settings(ENTRY_FEE), Box::new(InstantOracle::new(seed, 0)));
    engine
        .deposit_house_funds(&house(), 1_000_000)
        .expect("Owner deposit should succeed");
    engine
}

/// Scenario A: a fresh game is playing with the player's box drawn
#[test]
fn test_start_game() {
    let mut engine = instant_engine(1);
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();

    let game = engine.game(game_id).unwrap();
    assert_eq!(game.state, GameState::Playing);
    assert!(usize::from(game.player_box.unwrap()) < TOTAL_BOXES);
    assert_eq!(game.remaining_boxes.len(), 25);
    assert_eq!(game.prize_pool, engine.preview_prize_pool(ENTRY_FEE));
    assert_eq!(engine.player_games(&alice()), &[game_id]);
}

/// Scenario B: first round opens six boxes and makes an offer
#[test]
fn test_first_round_makes_offer() {
    let mut engine = instant_engine(2);
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    engine.eliminate(&alice(), game_id, 0).unwrap();

    let game = engine.game(game_id).unwrap();
    assert_eq!(game.remaining_boxes.len(), 19);
    assert_eq!(game.eliminated_boxes.len(), 6);
    assert_eq!(game.current_round, 1);
    assert_eq!(game.state, GameState::OfferMade);
    assert!(game.current_offer().unwrap() > 0);
}

/// Scenario C: eliminating again declines the standing offer
#[test]
fn test_second_round_declines_offer() {
    let mut engine = instant_engine(3);
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    engine.eliminate(&alice(), game_id, 0).unwrap();
    let first_offer = engine.current_offer(game_id).unwrap().unwrap();
    engine.drain_events();

    engine.eliminate(&alice(), game_id, 0).unwrap();
    let game = engine.game(game_id).unwrap();
    assert_eq!(game.current_round, 2);
    assert_eq!(game.eliminated_boxes.len(), 11);
    assert_eq!(game.remaining_boxes.len(), 14);
    assert!(game.current_offer().is_some());

    let events = engine.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::OfferDeclined { offer, .. } if *offer == first_offer
    )));
}

/// Scenario D: six rounds end the game with the player's own box
#[test]
fn test_full_game_pays_player_box() {
    let mut engine = instant_engine(4);
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    let balance_before = engine.house_balance();

    for _ in 0..6 {
        engine.eliminate(&alice(), game_id, 0).unwrap();
    }

    let game = engine.game(game_id).unwrap();
    let expected = game.prize_pool[usize::from(game.player_box.unwrap())];
    assert_eq!(game.state, GameState::GameCompleted);
    assert!(!game.is_active);
    assert_eq!(game.payout, Some(expected));
    assert_eq!(game.eliminated_boxes.len(), 21);
    assert_eq!(game.remaining_boxes.len(), 4);
    assert_eq!(engine.house_balance(), balance_before - expected);
    assert_eq!(engine.player_winnings(&alice()), expected);

    // Nothing more to do on a finished game
    assert!(matches!(
        engine.eliminate(&alice(), game_id, 0),
        Err(DealError::State(StateError::InvalidGameState { .. }))
    ));
}

/// Scenario E: another player can neither act on nor change the game
#[test]
fn test_other_player_rejected() {
    let mut engine = instant_engine(5);
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    engine.eliminate(&alice(), game_id, 0).unwrap();
    let before = engine.game(game_id).unwrap().clone();
    let balance = engine.house_balance();

    let mallory = PlayerId::from("mallory");
    assert_eq!(
        engine.accept_deal(&mallory, game_id),
        Err(AuthorizationError::NotYourGame { game_id }.into())
    );
    assert_eq!(
        engine.eliminate(&mallory, game_id, 0),
        Err(AuthorizationError::NotYourGame { game_id }.into())
    );
    assert_eq!(engine.game(game_id).unwrap(), &before);
    assert_eq!(engine.house_balance(), balance);
}

#[test]
fn test_accept_deal_pays_offer() {
    let mut engine = instant_engine(6);
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    engine.eliminate(&alice(), game_id, 0).unwrap();
    engine.eliminate(&alice(), game_id, 0).unwrap();

    let offer = engine.current_offer(game_id).unwrap().unwrap();
    let balance = engine.house_balance();
    assert_eq!(engine.accept_deal(&alice(), game_id).unwrap(), offer);

    let game = engine.game(game_id).unwrap();
    assert_eq!(game.state, GameState::DealTaken);
    assert!(!game.is_active);
    assert_eq!(game.payout, Some(offer));
    assert_eq!(engine.house_balance(), balance - offer);

    // Second acceptance is a state error, not a second payout
    assert!(matches!(
        engine.accept_deal(&alice(), game_id),
        Err(DealError::State(StateError::InvalidGameState { .. }))
    ));
    assert_eq!(engine.house_balance(), balance - offer);
}

#[test]
fn test_accept_requires_standing_offer() {
    let mut engine = instant_engine(7);
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    assert!(matches!(
        engine.accept_deal(&alice(), game_id),
        Err(DealError::State(StateError::InvalidGameState {
            state: GameState::Playing,
            ..
        }))
    ));
}

#[test]
fn test_accept_deal_insufficient_funds_is_retryable() {
    // No house float: only the entry fee backs the offer
    let mut engine = GameEngine::new(settings(ENTRY_FEE), Box::new(InstantOracle::new(8, 0)));
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    engine.eliminate(&alice(), game_id, 0).unwrap();
    let offer = engine.current_offer(game_id).unwrap().unwrap();
    let balance = engine.house_balance();
    if offer > balance {
        engine.withdraw_house_funds(&house(), balance).unwrap();
    } else {
        engine
            .withdraw_house_funds(&house(), balance - offer + 1)
            .unwrap();
    }
    let before = engine.game(game_id).unwrap().clone();

    let err = engine.accept_deal(&alice(), game_id).unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        DealError::Resource(ResourceError::HouseInsufficientFunds { .. })
    ));
    assert_eq!(engine.game(game_id).unwrap(), &before);

    engine.deposit_house_funds(&house(), offer).unwrap();
    assert_eq!(engine.accept_deal(&alice(), game_id).unwrap(), offer);
}

#[test]
fn test_deferred_oracle_full_game() {
    let mut engine = GameEngine::new(settings(ENTRY_FEE), Box::new(VrfOracle::new_random(0)));
    engine.deposit_house_funds(&house(), 1_000_000).unwrap();
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    assert_eq!(engine.pending_requests(), 1);
    assert_eq!(engine.poll_oracle(), 1);

    for round in 1..=6u8 {
        engine.eliminate(&alice(), game_id, 0).unwrap();
        // Nothing moves until the oracle delivers
        assert_eq!(engine.game(game_id).unwrap().current_round, round - 1);
        assert!(matches!(
            engine.eliminate(&alice(), game_id, 0),
            Err(DealError::State(StateError::RequestPending { .. }))
        ));
        if round > 1 {
            // A stale offer stays visible but cannot be taken mid-request
            assert!(matches!(
                engine.accept_deal(&alice(), game_id),
                Err(DealError::State(StateError::RequestPending { .. }))
            ));
        }
        assert_eq!(engine.poll_oracle(), 1);
        assert_eq!(engine.game(game_id).unwrap().current_round, round);
    }

    let game = engine.game(game_id).unwrap();
    assert_eq!(game.state, GameState::GameCompleted);
    assert!(game.rounds.iter().all(|r| r.proof.is_some()));
    for record in &game.rounds {
        let bundle = record.proof.as_ref().unwrap();
        assert!(VrfOracle::verify(bundle).unwrap());
    }
    assert_eq!(engine.pending_requests(), 0);
}

#[test]
fn test_replayed_and_unknown_fulfillments_rejected() {
    let mut engine = GameEngine::new(settings(ENTRY_FEE), Box::new(VrfOracle::new_random(0)));
    let game_id = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    let request_id = engine.game(game_id).unwrap().pending_request.unwrap();

    assert_eq!(
        engine.fulfill(Fulfillment::new(request_id + 100, Randomness([1; 32]))),
        Err(OracleError::UnknownRequest(request_id + 100).into())
    );

    engine
        .fulfill(Fulfillment::new(request_id, Randomness([1; 32])))
        .unwrap();
    let assigned = engine.game(game_id).unwrap().player_box;

    assert!(engine
        .fulfill(Fulfillment::new(request_id, Randomness([2; 32])))
        .is_err());
    assert_eq!(engine.game(game_id).unwrap().player_box, assigned);
    assert_eq!(engine.stats().fulfillments_rejected, 2);
}

#[test]
fn test_games_are_independent() {
    let mut engine = instant_engine(9);
    let bob = PlayerId::from("bob");
    let a = engine.start_game(&alice(), ENTRY_FEE, 0).unwrap();
    let b = engine.start_game(&bob, ENTRY_FEE, 0).unwrap();
    assert_ne!(a, b);

    engine.eliminate(&alice(), a, 0).unwrap();
    assert_eq!(engine.game(b).unwrap().current_round, 0);
    assert_eq!(engine.total_games(), 2);
    assert_eq!(engine.player_games(&bob), &[b]);
    assert!(engine.game(99).is_err());
}
