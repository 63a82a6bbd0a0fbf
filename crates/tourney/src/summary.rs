//! Win/draw/loss statistics of one engine against another.

use crate::session::Score;
use shakmaty::Color;
use std::fmt;

/// Wins, draws and losses from one engine's point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
}

impl Tally {
    pub fn record(&mut self, result: Score) {
        match result {
            Score::Win => self.wins += 1,
            Score::Draw => self.draws += 1,
            Score::Loss => self.losses += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.wins + self.draws + self.losses
    }

    pub fn win_pct(&self) -> f64 {
        self.pct(self.wins)
    }

    pub fn draw_pct(&self) -> f64 {
        self.pct(self.draws)
    }

    pub fn loss_pct(&self) -> f64 {
        self.pct(self.losses)
    }

    fn pct(&self, count: u32) -> f64 {
        match self.total() {
            0 => 0.0,
            total => f64::from(count) / f64::from(total) * 100.0,
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>4} games: {:>4} wins, {:>4} draws, {:>4} losses ({:.1}% / {:.1}% / {:.1}%)",
            self.total(),
            self.wins,
            self.draws,
            self.losses,
            self.win_pct(),
            self.draw_pct(),
            self.loss_pct()
        )
    }
}

/// Outcome for the engine that scored `own` against `other`.
pub fn result_for(own: f64, other: f64) -> Score {
    if own > other {
        Score::Win
    } else if own < other {
        Score::Loss
    } else {
        Score::Draw
    }
}

/// All games between two engines, split by the colour `engine` played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub engine: String,
    pub opponent: String,
    pub all: Tally,
    pub as_white: Tally,
    pub as_black: Tally,
}

impl Summary {
    pub fn new(engine: impl Into<String>, opponent: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            opponent: opponent.into(),
            all: Tally::default(),
            as_white: Tally::default(),
            as_black: Tally::default(),
        }
    }

    /// Counts one game in which `engine` played `color`.
    pub fn record(&mut self, color: Color, result: Score) {
        self.all.record(result);
        match color {
            Color::White => self.as_white.record(result),
            Color::Black => self.as_black.record(result),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Summary of games between {} and {}:",
            self.engine, self.opponent
        )?;
        for (heading, tally) in [
            ("All games", &self.all),
            ("Games as White", &self.as_white),
            ("Games as Black", &self.as_black),
        ] {
            writeln!(f, "    {}:", heading)?;
            if tally.total() > 0 {
                writeln!(f, "       {}", tally)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_tally_has_zero_percentages() {
        let tally = Tally::default();
        assert_eq!(tally.total(), 0);
        assert_eq!(tally.win_pct(), 0.0);
    }

    #[test]
    fn tally_row_format() {
        let tally = Tally {
            wins: 25,
            draws: 10,
            losses: 15,
        };
        assert_eq!(
            tally.to_string(),
            "  50 games:   25 wins,   10 draws,   15 losses (50.0% / 20.0% / 30.0%)"
        );
    }

    #[test]
    fn result_compares_scores() {
        assert_eq!(result_for(1.0, 0.0), Score::Win);
        assert_eq!(result_for(0.5, 0.5), Score::Draw);
        assert_eq!(result_for(0.0, 1.0), Score::Loss);
    }

    #[test]
    fn summary_splits_by_colour() {
        let mut summary = Summary::new("alpha", "beta");
        summary.record(Color::White, Score::Win);
        summary.record(Color::White, Score::Draw);
        summary.record(Color::Black, Score::Loss);

        assert_eq!(summary.all.total(), 3);
        assert_eq!(summary.as_white.wins, 1);
        assert_eq!(summary.as_white.draws, 1);
        assert_eq!(summary.as_black.losses, 1);
    }

    #[test]
    fn display_omits_empty_rows() {
        let mut summary = Summary::new("alpha", "beta");
        summary.record(Color::White, Score::Win);
        let text = summary.to_string();

        assert!(text.starts_with("Summary of games between alpha and beta:\n"));
        assert!(text.contains("    Games as White:\n          1 games:"));
        assert!(text.ends_with("    Games as Black:\n"));
    }

    fn arb_game() -> impl Strategy<Value = (Color, Score)> {
        (
            prop_oneof![Just(Color::White), Just(Color::Black)],
            prop_oneof![Just(Score::Win), Just(Score::Draw), Just(Score::Loss)],
        )
    }

    proptest! {
        #[test]
        fn tallies_stay_consistent(games in prop::collection::vec(arb_game(), 0..200)) {
            let mut summary = Summary::new("a", "b");
            for (color, result) in &games {
                summary.record(*color, *result);
            }

            let all = summary.all;
            prop_assert_eq!(all.total() as usize, games.len());
            prop_assert_eq!(all.wins + all.draws + all.losses, all.total());
            prop_assert_eq!(all.total(), summary.as_white.total() + summary.as_black.total());
            prop_assert_eq!(all.wins, summary.as_white.wins + summary.as_black.wins);
            if all.total() > 0 {
                let sum = all.win_pct() + all.draw_pct() + all.loss_pct();
                prop_assert!((sum - 100.0).abs() < 1e-9);
            }
        }
    }
}
