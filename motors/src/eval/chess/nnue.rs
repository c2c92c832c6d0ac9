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

//! A quantized perspective-net (NNUE) evaluator.
//!
//! The network is a single hidden layer with `HIDDEN_SIZE` neurons, fed by two 768-wide binary
//! feature sets (one per perspective, `(piece color relative to the perspective, piece type, square
//! relative to the perspective)`), activated with SCReLU (`clamp(x, 0, QA)^2`) and combined with an
//! output-bucket-selected linear layer. Weights aren't shipped with the engine; load them with
//! `setoption name NNUEPath value <path>` before the first `go`. Until that happens, `eval` returns
//! a neutral score of zero rather than refusing to play.

use std::fmt::Display;
use std::mem::size_of;
use std::sync::Arc;

use gears::games::chess::pieces::ChessPieceType;
use gears::games::chess::pieces::ChessPieceType::*;
use gears::games::chess::squares::ChessSquare;
use gears::games::chess::ChessColor::{Black, White};
use gears::games::chess::{ChessColor, Chessboard};
use gears::games::{Color, ColoredPiece, ColoredPieceType};
use gears::general::bitboards::{Bitboard, RawBitboard};
use gears::general::board::{BitboardBoard, Board};
use gears::general::common::StaticallyNamedEntity;
use gears::general::moves::Move;
use gears::general::squares::RectangularCoordinates;
use gears::score::{Score, ScoreT, MAX_NORMAL_SCORE, MIN_NORMAL_SCORE};

use crate::eval::Eval;

pub const HIDDEN_SIZE: usize = 1568;
pub const QA: i32 = 255;
pub const QB: i32 = 64;
pub const SCALE: i32 = 400;
pub const NUM_OUTPUT_BUCKETS: usize = 8;
pub const NUM_INPUT_FEATURES: usize = 2 * 6 * 64;

const NETWORK_BYTES: usize =
    (NUM_INPUT_FEATURES * HIDDEN_SIZE + HIDDEN_SIZE + NUM_OUTPUT_BUCKETS * 2 * HIDDEN_SIZE + NUM_OUTPUT_BUCKETS) * size_of::<i16>();

/// The quantized weights, loaded wholesale from a flat little-endian binary file produced by the
/// trainer. There's no embedded default network; the engine plays without one (always scoring 0)
/// until `NNUEPath` is set.
#[derive(Clone)]
pub struct Network {
    feature_weights: Vec<i16>,
    feature_bias: Vec<i16>,
    output_weights: Vec<i16>,
    output_bias: Vec<i16>,
}

impl Network {
    fn feature_weight(&self, feature_idx: usize) -> &[i16] {
        &self.feature_weights[feature_idx * HIDDEN_SIZE..(feature_idx + 1) * HIDDEN_SIZE]
    }

    fn output_weight_half(&self, bucket: usize, half: usize) -> &[i16] {
        let start = bucket * 2 * HIDDEN_SIZE + half * HIDDEN_SIZE;
        &self.output_weights[start..start + HIDDEN_SIZE]
    }

    pub fn load(path: &str) -> Result<Self, String> {
        let bytes = std::fs::read(path).map_err(|err| format!("failed to open '{path}': {err}"))?;
        if bytes.len() != NETWORK_BYTES {
            return Err(format!(
                "size mismatch: file has {0} bytes, expected {NETWORK_BYTES}",
                bytes.len()
            ));
        }
        let mut values = bytes.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]));
        let feature_weights: Vec<i16> = (&mut values).take(NUM_INPUT_FEATURES * HIDDEN_SIZE).collect();
        let feature_bias: Vec<i16> = (&mut values).take(HIDDEN_SIZE).collect();
        let output_weights: Vec<i16> = (&mut values).take(NUM_OUTPUT_BUCKETS * 2 * HIDDEN_SIZE).collect();
        let output_bias: Vec<i16> = values.collect();
        debug_assert_eq!(feature_weights.len(), NUM_INPUT_FEATURES * HIDDEN_SIZE);
        debug_assert_eq!(output_bias.len(), NUM_OUTPUT_BUCKETS);
        Ok(Self { feature_weights, feature_bias, output_weights, output_bias })
    }
}

/// Index into `feature_weights` for a piece of the given color and type standing on `square`,
/// as seen from `perspective`. Both perspectives share the same weight table; the square is
/// mirrored vertically for the perspective that isn't looking at the board "normally" so that
/// the network always sees "my pieces are near rank 0" regardless of which side is asking.
fn feature_index(perspective: ChessColor, piece_color: ChessColor, piece: ChessPieceType, square: ChessSquare) -> usize {
    let color_offset = if piece_color == perspective { 0 } else { 6 };
    let relative_square = if perspective == Black { square.flip() } else { square };
    (color_offset + piece as usize) * 64 + relative_square.bb_idx()
}

fn screlu(x: i16) -> i32 {
    let clamped = x.clamp(0, QA as i16) as i32;
    clamped * clamped
}

/// One perspective's hidden-layer activations for a single ply.
type Accumulator = Vec<i16>;

fn fresh_accumulator(network: &Network) -> [Accumulator; 2] {
    [network.feature_bias.clone(), network.feature_bias.clone()]
}

fn add_feature(acc: &mut Accumulator, weights: &[i16]) {
    for (v, w) in acc.iter_mut().zip(weights) {
        *v += *w;
    }
}

fn remove_feature(acc: &mut Accumulator, weights: &[i16]) {
    for (v, w) in acc.iter_mut().zip(weights) {
        *v -= *w;
    }
}

fn add_piece(accs: &mut [Accumulator; 2], network: &Network, color: ChessColor, piece: ChessPieceType, square: ChessSquare) {
    add_feature(&mut accs[White as usize], network.feature_weight(feature_index(White, color, piece, square)));
    add_feature(&mut accs[Black as usize], network.feature_weight(feature_index(Black, color, piece, square)));
}

fn remove_piece(accs: &mut [Accumulator; 2], network: &Network, color: ChessColor, piece: ChessPieceType, square: ChessSquare) {
    remove_feature(&mut accs[White as usize], network.feature_weight(feature_index(White, color, piece, square)));
    remove_feature(&mut accs[Black as usize], network.feature_weight(feature_index(Black, color, piece, square)));
}

fn evaluate_bucket(num_pieces: u32) -> usize {
    ((num_pieces.saturating_sub(2)) as usize / (32 / NUM_OUTPUT_BUCKETS)).min(NUM_OUTPUT_BUCKETS - 1)
}

/// Dot-products the two SCReLU-activated halves against a bucket's output weights.
/// The scalar and AVX2 paths must agree bit-for-bit; the SIMD path just reassociates the same
/// sequence of `i32` multiply-adds that the scalar loop performs one lane at a time.
fn output_dot(us: &Accumulator, them: &Accumulator, network: &Network, bucket: usize) -> i32 {
    #[cfg(all(feature = "unsafe", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("avx2") {
            // Safety: guarded by the runtime feature check above, and both accumulators and weight
            // slices are `HIDDEN_SIZE` (a multiple of 16) `i16`s long.
            return unsafe { output_dot_avx2(us, them, network, bucket) };
        }
    }
    output_dot_scalar(us, them, network, bucket)
}

fn output_dot_scalar(us: &Accumulator, them: &Accumulator, network: &Network, bucket: usize) -> i32 {
    let us_weights = network.output_weight_half(bucket, 0);
    let them_weights = network.output_weight_half(bucket, 1);
    let mut output = 0i32;
    for i in 0..HIDDEN_SIZE {
        output += screlu(us[i]) * us_weights[i] as i32;
        output += screlu(them[i]) * them_weights[i] as i32;
    }
    output
}

#[cfg(all(feature = "unsafe", target_arch = "x86_64"))]
#[target_feature(enable = "avx2")]
unsafe fn output_dot_avx2(us: &Accumulator, them: &Accumulator, network: &Network, bucket: usize) -> i32 {
    use std::arch::x86_64::*;

    let us_weights = network.output_weight_half(bucket, 0);
    let them_weights = network.output_weight_half(bucket, 1);
    let zero = _mm256_setzero_si256();
    let qa = _mm256_set1_epi16(QA as i16);
    let mut sum = zero;

    for i in (0..HIDDEN_SIZE).step_by(16) {
        let us_vals = _mm256_loadu_si256(us.as_ptr().add(i) as *const __m256i);
        let them_vals = _mm256_loadu_si256(them.as_ptr().add(i) as *const __m256i);
        let us_w = _mm256_loadu_si256(us_weights.as_ptr().add(i) as *const __m256i);
        let them_w = _mm256_loadu_si256(them_weights.as_ptr().add(i) as *const __m256i);

        let us_clamped = _mm256_min_epi16(_mm256_max_epi16(us_vals, zero), qa);
        let them_clamped = _mm256_min_epi16(_mm256_max_epi16(them_vals, zero), qa);

        let us_terms = _mm256_madd_epi16(_mm256_mullo_epi16(us_w, us_clamped), us_clamped);
        let them_terms = _mm256_madd_epi16(_mm256_mullo_epi16(them_w, them_clamped), them_clamped);

        sum = _mm256_add_epi32(sum, us_terms);
        sum = _mm256_add_epi32(sum, them_terms);
    }

    let hi = _mm256_extracti128_si256(sum, 1);
    let lo = _mm256_castsi256_si128(sum);
    let x128 = _mm_add_epi32(hi, lo);
    let x64 = _mm_add_epi32(x128, _mm_shuffle_epi32(x128, 0b01_00_11_10));
    let x32 = _mm_add_epi32(x64, _mm_shuffle_epi32(x64, 0b01_01_01_01));
    _mm_cvtsi128_si32(x32)
}

/// Maximum search ply this evaluator can track incrementally; deep enough for any realistic search
/// depth plus quiescence. Positions reached beyond this just fall back to a fresh [`initialize`].
const MAX_NNUE_PLY: usize = 256;

#[derive(Clone)]
pub struct NnueEval {
    network: Option<Arc<Network>>,
    accumulators: Vec<[Accumulator; 2]>,
}

impl std::fmt::Debug for NnueEval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NnueEval").field("loaded", &self.network.is_some()).finish()
    }
}

impl Default for NnueEval {
    fn default() -> Self {
        Self { network: None, accumulators: Vec::new() }
    }
}

impl NnueEval {
    fn ensure_stack(&mut self, network: &Network) {
        if self.accumulators.is_empty() {
            self.accumulators = (0..MAX_NNUE_PLY).map(|_| fresh_accumulator(network)).collect();
        }
    }

    /// Rebuilds the ply-0 accumulator from scratch by walking every occupied square.
    fn initialize(&mut self, network: &Network, pos: &Chessboard) {
        self.ensure_stack(network);
        self.accumulators[0] = fresh_accumulator(network);
        for square in pos.occupied_bb().ones() {
            let piece = pos.colored_piece_on(square);
            let Some(color) = piece.colored_piece_type().color() else { continue };
            add_piece(&mut self.accumulators[0], network, color, piece.colored_piece_type().uncolor(), square);
        }
    }

    /// Derives `accumulators[ply]` from `accumulators[ply - 1]` by applying the feature deltas for
    /// `mov`. Mirrors the by-move-kind handling of a C++ engine this evaluator was ported from:
    /// normal moves move one piece and maybe remove a capture, promotions replace the pawn with the
    /// promoted piece, en passant removes the pawn on the epsquare instead of the destination, and
    /// castling moves both the king and the rook (the move's `to` square is the rook's square).
    fn apply_move(&mut self, network: &Network, old_pos: &Chessboard, mov: gears::games::chess::moves::ChessMove, ply: usize) {
        self.ensure_stack(network);
        if ply == 0 || ply >= self.accumulators.len() {
            return;
        }
        self.accumulators[ply] = self.accumulators[ply - 1].clone();
        let acc = &mut self.accumulators[ply];
        let mover = old_pos.active_player();
        let enemy = mover.other();

        if mov.is_castle() {
            let king_sq = mov.src_square();
            let rook_sq = mov.dest_square();
            let side = mov.castle_side();
            let rank = king_sq.rank();
            let king_to = ChessSquare::from_rank_file(rank, side.king_dest_file());
            let rook_to = ChessSquare::from_rank_file(rank, side.rook_dest_file());
            remove_piece(acc, network, mover, King, king_sq);
            add_piece(acc, network, mover, King, king_to);
            remove_piece(acc, network, mover, Rook, rook_sq);
            add_piece(acc, network, mover, Rook, rook_to);
        } else if mov.is_ep() {
            let from = mov.src_square();
            let to = mov.dest_square();
            remove_piece(acc, network, mover, Pawn, from);
            add_piece(acc, network, mover, Pawn, to);
            let ep_taken = mov.square_of_pawn_taken_by_ep().expect("ep move always has an ep square");
            remove_piece(acc, network, enemy, Pawn, ep_taken);
        } else if mov.is_promotion() {
            let from = mov.src_square();
            let to = mov.dest_square();
            let captured = mov.captured(old_pos);
            remove_piece(acc, network, mover, Pawn, from);
            add_piece(acc, network, mover, mov.promo_piece(), to);
            if captured != Empty {
                remove_piece(acc, network, enemy, captured, to);
            }
        } else {
            let from = mov.src_square();
            let to = mov.dest_square();
            let piece = mov.piece_type();
            let captured = mov.captured(old_pos);
            remove_piece(acc, network, mover, piece, from);
            add_piece(acc, network, mover, piece, to);
            if captured != Empty {
                remove_piece(acc, network, enemy, captured, to);
            }
        }
    }

    fn evaluate_from(&self, network: &Network, pos: &Chessboard, ply: usize) -> Score {
        let side = pos.active_player() as usize;
        let acc = &self.accumulators[ply];
        let bucket = evaluate_bucket(pos.occupied_bb().raw().num_ones() as u32);
        let mut output = output_dot(&acc[side], &acc[side ^ 1], network, bucket);
        output /= QA;
        output += network.output_bias[bucket] as i32;
        output *= SCALE;
        output /= QA * QB;
        Score(output.clamp(MIN_NORMAL_SCORE.0, MAX_NORMAL_SCORE.0) as ScoreT)
    }
}

impl StaticallyNamedEntity for NnueEval {
    fn static_short_name() -> impl Display
    where
        Self: Sized,
    {
        "nnue"
    }

    fn static_long_name() -> String
    where
        Self: Sized,
    {
        "NNUE: Efficiently Updatable Neural Network Eval".to_string()
    }

    fn static_description() -> String
    where
        Self: Sized,
    {
        "A quantized perspective-net evaluation function. Requires a network file loaded through \
        'setoption name NNUEPath value <path>'; scores everything as a draw until one is loaded."
            .to_string()
    }
}

impl Eval<Chessboard> for NnueEval {
    fn eval(&mut self, pos: &Chessboard, ply: usize, _engine_color: ChessColor) -> Score {
        let Some(network) = self.network.clone() else { return Score(0) };
        if ply == 0 {
            self.initialize(&network, pos);
        }
        let ply = ply.min(self.accumulators.len().saturating_sub(1));
        self.evaluate_from(&network, pos, ply)
    }

    fn eval_incremental(
        &mut self,
        old_pos: &Chessboard,
        mov: gears::games::chess::moves::ChessMove,
        new_pos: &Chessboard,
        ply: usize,
        _engine_color: ChessColor,
    ) -> Score {
        let Some(network) = self.network.clone() else { return Score(0) };
        if ply == 0 || ply >= self.accumulators.len() {
            self.initialize(&network, new_pos);
            let ply = ply.min(self.accumulators.len().saturating_sub(1));
            return self.evaluate_from(&network, new_pos, ply);
        }
        self.apply_move(&network, old_pos, mov, ply);
        self.evaluate_from(&network, new_pos, ply)
    }

    fn piece_scale(&self) -> ScoreT {
        3
    }

    fn load_params_from_file(&mut self, path: &str) -> Result<(), String> {
        let network = Network::load(path)?;
        self.network = Some(Arc::new(network));
        self.accumulators.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_network() -> Network {
        Network {
            feature_weights: vec![1; NUM_INPUT_FEATURES * HIDDEN_SIZE],
            feature_bias: vec![0; HIDDEN_SIZE],
            output_weights: vec![1; NUM_OUTPUT_BUCKETS * 2 * HIDDEN_SIZE],
            output_bias: vec![0; NUM_OUTPUT_BUCKETS],
        }
    }

    #[test]
    fn screlu_clamps_and_squares() {
        assert_eq!(screlu(-5), 0);
        assert_eq!(screlu(0), 0);
        assert_eq!(screlu(10), 100);
        assert_eq!(screlu(QA as i16), (QA * QA));
        assert_eq!(screlu(i16::MAX), QA * QA);
    }

    #[test]
    fn feature_index_mirrors_for_black_perspective() {
        let sq = ChessSquare::from_rank_file(1, 4);
        let white_view = feature_index(White, White, Pawn, sq);
        let black_view = feature_index(Black, White, Pawn, sq);
        assert_ne!(white_view, black_view);
        // same side, same piece, vertically mirrored square -> same relative offset from each
        // perspective's own edge of the board.
        let mirrored = feature_index(Black, White, Pawn, sq.flip());
        assert_eq!(white_view, mirrored);
    }

    #[test]
    fn scalar_dot_matches_hand_computation() {
        let network = dummy_network();
        let us: Accumulator = vec![300; HIDDEN_SIZE];
        let them: Accumulator = vec![-10; HIDDEN_SIZE];
        let got = output_dot_scalar(&us, &them, &network, 0);
        let expected = (HIDDEN_SIZE as i32) * (screlu(300) + screlu(-10));
        assert_eq!(got, expected);
    }

    #[test]
    fn no_network_evaluates_to_neutral_score() {
        let mut eval = NnueEval::default();
        let pos = Chessboard::default();
        assert_eq!(eval.eval(&pos, 0, White), Score(0));
    }

    #[test]
    fn evaluate_bucket_is_monotonic_and_in_range() {
        for pieces in 2..33 {
            let bucket = evaluate_bucket(pieces);
            assert!(bucket < NUM_OUTPUT_BUCKETS);
        }
        assert!(evaluate_bucket(2) <= evaluate_bucket(32));
    }
}
