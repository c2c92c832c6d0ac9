/*
 *  Motors, a collection of board game engines.
 *  Copyright (C) 2024 ToTheAnd
 *
 *  Motors is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  Motors is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with Motors. If not, see <https://www.gnu.org/licenses/>.
 */

//! Time allocation for a single move, based on the remaining clock time.
//!
//! The soft time limit grows with the game ply and shrinks the less time is left on the clock,
//! using a handful of constants that were fit against self-play data rather than derived
//! analytically. `move_overhead` has already been subtracted from `tc.remaining` by the ugi layer
//! by the time [`optimum_time`] runs, so it doesn't appear in the formula below even though the
//! engine this was ported from subtracts it here instead.

use gears::search::TimeControl;
use std::time::Duration;

/// Per-game scaling factor, fit once per game from the time left after the first move and then
/// reused for every later call so that very long or very short games don't get a wildly different
/// allocation curve than the one the constants below were tuned for.
#[derive(Debug, Default, Copy, Clone)]
pub struct TimeAdjust(Option<f64>);

impl TimeAdjust {
    pub fn reset(&mut self) {
        self.0 = None;
    }

    fn get_or_init(&mut self, time_left: f64) -> f64 {
        *self.0.get_or_insert_with(|| 0.3128 * time_left.log10() - 0.4354)
    }
}

/// Returns the soft time limit for this move, i.e. the time the engine should aim to use; the
/// caller is still expected to clamp this against `fixed_time`/`tc.remaining` as usual.
///
/// Does nothing useful (and should not be called) for an infinite time control; callers must check
/// `tc.is_infinite()` themselves first, same as the unscaled soft limit this replaces.
pub fn optimum_time(tc: TimeControl, fullmove_number: usize, adjust: &mut TimeAdjust) -> Duration {
    let time = tc.remaining.as_secs_f64() * 1000.0;
    let inc = tc.increment.as_secs_f64() * 1000.0;
    let ply = (fullmove_number.max(1) - 1) as f64 * 2.0;

    let cent_mtg = if time < 1000.0 { time * 5.051 } else { 5051.0 };
    let time_left = (time + inc * (cent_mtg - 100.0) / 100.0).max(1.0);

    let original_time_adjust = adjust.get_or_init(time_left);

    let logtime_in_sec = (time / 1000.0).max(1e-6).log10();
    let opt_constant = (0.003_211_6 + 0.000_321_123 * logtime_in_sec).min(0.005_080_17);
    let opt_scale =
        (0.020_143_1 + (ply + 2.946_93).powf(0.461_073) * opt_constant).min(0.213_035 * time / time_left) * original_time_adjust;

    let optimum_time = (opt_scale * time_left).max(100.0);
    Duration::from_secs_f64((optimum_time / 1000.0).max(0.0))
}
