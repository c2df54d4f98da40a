//! Monte Carlo estimate of the house edge under a fixed player strategy.
//!
//! Plays many games against an in-process engine with the instant oracle and
//! reports the player's mean net result per unit of entry fee.

use clap::{Parser, ValueEnum};
use dealornot::{
    config::EntryFeeMode,
    games::{
        calculate_offer, Amount, GameEngine, GameId, GameSettings, GameState, InstantOracle,
        PlayerId, PrizeLadder,
    },
    DealResult,
};
use std::{collections::BTreeMap, str::FromStr};

const FEE: Amount = 10_000; // avoids truncation on the smallest ladder step

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LadderArg {
    Standard,
    HighStakes,
}

impl From<LadderArg> for PrizeLadder {
    fn from(value: LadderArg) -> Self {
        match value {
            LadderArg::Standard => PrizeLadder::Standard,
            LadderArg::HighStakes => PrizeLadder::HighStakes,
        }
    }
}

/// When the simulated player takes the banker's offer
#[derive(Clone, Copy, Debug, PartialEq)]
enum Strategy {
    AlwaysContinue,
    AcceptAtRound(u8),
    /// Accept once the offer reaches this share (percent) of the expected value
    AcceptAbove(u8),
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let number = |arg: Option<&str>| -> Result<u8, String> {
            arg.ok_or_else(|| format!("strategy '{}' needs a value", name))?
                .parse::<u8>()
                .map_err(|e| format!("invalid strategy value: {}", e))
        };
        match name {
            "always-continue" => Ok(Strategy::AlwaysContinue),
            "accept-at-round" => Ok(Strategy::AcceptAtRound(number(arg)?)),
            "accept-above" => Ok(Strategy::AcceptAbove(number(arg)?)),
            other => Err(format!(
                "unknown strategy '{}' (always-continue, accept-at-round:R, accept-above:P)",
                other
            )),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "dealornot-sim")]
#[command(about = "Estimate the house edge of a strategy", long_about = None)]
struct Args {
    /// Number of games to play
    #[arg(long, default_value = "10000")]
    games: u64,

    #[arg(long, value_enum, default_value = "standard")]
    ladder: LadderArg,

    /// Banker offer as a percentage of expected value
    #[arg(long, default_value = "75")]
    house_percentage: u8,

    /// always-continue | accept-at-round:R | accept-above:P
    #[arg(long, default_value = "always-continue")]
    strategy: Strategy,

    /// Seed for the instant oracle
    #[arg(long, default_value = "1")]
    seed: u64,
}

#[derive(Default, Clone)]
struct Stats {
    trials: u64,
    total_net: f64,
    total_net_sq: f64,
    total_wagered: f64,
    deals: u64,
    completions: u64,
    ended_at_round: BTreeMap<u8, u64>,
}

impl Stats {
    fn add(&mut self, payout: Amount, wagered: Amount, round: u8, dealt: bool) {
        let net = payout as f64 - wagered as f64;
        self.trials += 1;
        self.total_net += net;
        self.total_net_sq += net * net;
        self.total_wagered += wagered as f64;
        if dealt {
            self.deals += 1;
        } else {
            self.completions += 1;
        }
        *self.ended_at_round.entry(round).or_default() += 1;
    }

    fn mean_net(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.total_net / self.trials as f64
        }
    }

    fn mean_wagered(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.total_wagered / self.trials as f64
        }
    }

    fn house_edge(&self) -> f64 {
        let mw = self.mean_wagered();
        if mw == 0.0 {
            0.0
        } else {
            -self.mean_net() / mw
        }
    }

    fn stderr(&self) -> f64 {
        if self.trials <= 1 {
            return 0.0;
        }
        let mean = self.mean_net();
        let var = (self.total_net_sq / self.trials as f64) - mean * mean;
        let var = if var < 0.0 { 0.0 } else { var };
        (var / self.trials as f64).sqrt()
    }
}

fn should_accept(strategy: Strategy, engine: &GameEngine, game_id: GameId) -> DealResult<bool> {
    let game = engine.game(game_id)?;
    let Some(offer) = game.current_offer() else {
        return Ok(false);
    };
    Ok(match strategy {
        Strategy::AlwaysContinue => false,
        Strategy::AcceptAtRound(round) => game.current_round >= round,
        Strategy::AcceptAbove(percent) => {
            let values: Vec<Amount> = game
                .remaining_boxes
                .iter()
                .map(|&b| game.prize_pool[usize::from(b)])
                .collect();
            let player_value = game.player_box_value().unwrap_or(0);
            let expected = calculate_offer(&values, player_value, 100);
            offer * 100 >= expected * Amount::from(percent)
        }
    })
}

/// Play one game to the end; returns (payout, final round, took the deal)
fn play(
    engine: &mut GameEngine,
    player: &PlayerId,
    strategy: Strategy,
) -> DealResult<(Amount, u8, bool)> {
    let game_id = engine.start_game(player, FEE, 0)?;
    loop {
        if should_accept(strategy, engine, game_id)? {
            let payout = engine.accept_deal(player, game_id)?;
            let round = engine.game(game_id)?.current_round;
            return Ok((payout, round, true));
        }

        engine.eliminate(player, game_id, 0)?;
        let game = engine.game(game_id)?;
        if game.state == GameState::GameCompleted {
            return Ok((game.payout.unwrap_or(0), game.current_round, false));
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let ladder = PrizeLadder::from(args.ladder);

    let settings = GameSettings {
        house_percentage: args.house_percentage,
        prize_ladder: ladder,
        entry_fee_mode: EntryFeeMode::Fixed,
        entry_fee: FEE,
        ..GameSettings::default()
    };
    let owner = settings.owner.clone();
    let mut engine = GameEngine::new(settings, Box::new(InstantOracle::new(args.seed, 0)));

    // Enough to cover the top box of every game
    let top_box = ladder.generate(FEE).last().copied().unwrap_or(FEE);
    engine.deposit_house_funds(&owner, top_box.saturating_mul(Amount::from(args.games.max(1))))?;

    let player = PlayerId::from("simulator");
    let mut stats = Stats::default();
    for _ in 0..args.games {
        let (payout, round, dealt) = play(&mut engine, &player, args.strategy)?;
        stats.add(payout, FEE, round, dealt);
        engine.drain_events();
    }

    println!("Deal or No Deal house edge");
    println!("  ladder:            {}", ladder);
    println!("  house percentage:  {}%", args.house_percentage);
    println!("  strategy:          {:?}", args.strategy);
    println!("  games:             {}", stats.trials);
    println!("  deals / completed: {} / {}", stats.deals, stats.completions);
    println!("  avg net per game:  {:.2} (fee {})", stats.mean_net(), FEE);
    println!(
        "  house edge:        {:.3}% +/- {:.3}%",
        stats.house_edge() * 100.0,
        stats.stderr() / stats.mean_wagered().max(1.0) * 100.0
    );
    println!("  games ending per round:");
    for (round, count) in &stats.ended_at_round {
        println!("    round {}: {}", round, count);
    }
    Ok(())
}
