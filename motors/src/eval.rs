use dyn_clone::DynClone;
use gears::games::Color;
use gears::general::board::Board;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use gears::general::common::StaticallyNamedEntity;
use gears::score::{PhaseType, PhasedScore, Score, ScoreT};

pub mod rand_eval;

#[cfg(feature = "chess")]
pub mod chess;

pub trait Eval<B: Board>: Debug + Send + StaticallyNamedEntity + DynClone + 'static {
    /// Eval the given board at the given depth in a search. To just eval a single position,
    /// `eval_simple` can be used, which sets `ply` to 0 and `engine_color` to the first color.
    /// `ply` is used for keeping track of incremental updates (e.g. indexing an accumulator stack);
    /// `engine_color` is the color the engine is playing as for this search, which stays fixed across
    /// plies even though the side to move alternates -- most eval functions completely ignore it.
    fn eval(&mut self, pos: &B, _ply: usize, _engine_color: B::Color) -> Score;

    /// Eval a single position. Calls [`eval`] with default values for `_ply` and `_engine_color`.
    fn eval_simple(&mut self, pos: &B) -> Score {
        self.eval(pos, 0, B::Color::first())
    }

    /// Eval this position while potentially reusing information computed for the old position.
    /// The default implementation ignores `_old_pos` and simply forwards to [`eval`].
    fn eval_incremental(
        &mut self,
        _old_pos: &B,
        _mov: B::Move,
        new_pos: &B,
        ply: usize,
        engine_color: B::Color,
    ) -> Score {
        self.eval(new_pos, ply, engine_color)
    }

    /// How much larger do we expect variation in piece scores to be than variation in eval scores?
    /// This is used for coloring the eval score in the pretty 'eval' command, which removes each piece
    /// and prints the resulting eval delta. The value returned by this function doesn't have to be
    /// exact or calculated in any complex way, it just needs to be a rough ballpark estimate:
    /// For example, in chess, queen values are typically much larger than whole eval values,
    /// but in other games like ataxx or mnk, there isn't that much of a difference
    fn piece_scale(&self) -> ScoreT {
        2
    }

    /// Reload this eval's parameters (e.g. an NNUE network) from a file. Most evals don't support
    /// this and simply return an error, which the caller logs and otherwise ignores, leaving the
    /// previous eval in place.
    fn load_params_from_file(&mut self, _path: &str) -> Result<(), String> {
        Err("this evaluation function doesn't support loading parameters from a file".to_string())
    }
}

#[expect(type_alias_bounds)]
pub type SingleFeatureScore<S: ScoreType> = S::SingleFeatureScore;

/// There is only one implementation of this trait in this crate: [`PhasedScore`].
///
/// It should be easy to implement this for other scores, but the reason it's a trait is that in the [`pliers`] crate,
/// there is a trace that also implements this trait so that it can be used for tuning without needing to duplicate the
/// eval function.
pub trait ScoreType:
    Debug
    + Default
    + Clone
    + Send
    + Eq
    + PartialEq
    + Add<Output = Self>
    + AddAssign
    + Add<Self::SingleFeatureScore, Output = Self>
    + AddAssign<Self::SingleFeatureScore>
    + Sub<Output = Self>
    + SubAssign
    + Sub<Self::SingleFeatureScore, Output = Self>
    + SubAssign<Self::SingleFeatureScore>
    + Neg<Output = Self>
    + Mul<usize, Output = Self>
    + From<Self::SingleFeatureScore>
    + 'static
{
    type Finalized: Default;
    type SingleFeatureScore: Default + Mul<usize, Output = Self::SingleFeatureScore>;

    fn finalize<C: Color>(
        self,
        phase: PhaseType,
        max_phase: PhaseType,
        color: C,
        tempo: Self::Finalized,
    ) -> Self::Finalized;
}

impl ScoreType for PhasedScore {
    type Finalized = Score;
    type SingleFeatureScore = Self;

    fn finalize<C: Color>(
        self,
        phase: PhaseType,
        max_phase: PhaseType,
        color: C,
        tempo: Self::Finalized,
    ) -> Score {
        let score = self.taper(phase, max_phase);
        tempo + if color.is_first() { score } else { -score }
    }
}
