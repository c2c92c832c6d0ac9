use crate::games::chess::ChessColor::Black;
use crate::games::chess::pieces::ChessPieceType;
use crate::games::chess::pieces::ChessPieceType::Pawn;
use crate::games::chess::squares::{ChessSquare, NUM_COLUMNS};
use crate::games::chess::{ChessColor, Chessboard, Hashes};
use crate::games::{Color, NUM_COLORS, PosHash};
use crate::general::bitboards::Bitboard;
use crate::general::board::BitboardBoard;
use crate::general::squares::RectangularCoordinates;

pub const NUM_PIECE_SQUARE_ENTRIES: usize = 64 * 6;
pub const NUM_COLORED_PIECE_SQUARE_ENTRIES: usize = NUM_PIECE_SQUARE_ENTRIES * 2;

pub struct PrecomputedZobristKeys {
    pub piece_square_keys: [PosHash; NUM_COLORED_PIECE_SQUARE_ENTRIES],
    pub castle_keys: [PosHash; 1 << (2 * 2)],
    pub ep_file_keys: [PosHash; NUM_COLUMNS],
    pub side_to_move_key: PosHash,
}

impl PrecomputedZobristKeys {
    pub fn piece_key(&self, piece: ChessPieceType, color: ChessColor, square: ChessSquare) -> PosHash {
        self.piece_square_keys[square.bb_idx() + piece as usize * 64 + color as usize * 64 * 6]
    }
}

/// A simple `const` random number generator adapted from my C++ algebra implementation,
/// originally from here: <https://www.pcg-random.org/> (I hate that website)
struct PcgXslRr128_64Oneseq(u128);

const MUTLIPLIER: u128 = (2_549_297_995_355_413_924 << 64) + 4_865_540_595_714_422_341;
const INCREMENT: u128 = (6_364_136_223_846_793_005 << 64) + 1_442_695_040_888_963_407;

// the pcg xsl rr 128 64 oneseq generator, aka pcg64_oneseq (most other pcg generators have additional problems)
impl PcgXslRr128_64Oneseq {
    const fn new(seed: u128) -> Self {
        Self(seed.wrapping_add(INCREMENT).wrapping_mul(MUTLIPLIER).wrapping_add(INCREMENT))
    }

    const fn generate(&mut self) -> PosHash {
        self.0 = self.0.wrapping_mul(MUTLIPLIER);
        self.0 = self.0.wrapping_add(INCREMENT);
        let upper = (self.0 >> 64) as u64;
        let xored = upper ^ (self.0 as u64);
        PosHash(xored.rotate_right((upper >> (122 - 64)) as u32))
    }
}

pub const ZOBRIST_KEYS: PrecomputedZobristKeys = {
    let mut res = {
        PrecomputedZobristKeys {
            piece_square_keys: [PosHash(0); NUM_COLORED_PIECE_SQUARE_ENTRIES],
            castle_keys: [PosHash(0); 1 << (2 * 2)],
            ep_file_keys: [PosHash(0); NUM_COLUMNS],
            side_to_move_key: PosHash(0),
        }
    };
    let mut generator = PcgXslRr128_64Oneseq::new(0x42);
    let mut i = 0;
    while i < NUM_COLORED_PIECE_SQUARE_ENTRIES {
        res.piece_square_keys[i] = generator.generate();
        i += 1;
    }
    let mut i = 0;
    while i < res.castle_keys.len() {
        res.castle_keys[i] = generator.generate();
        i += 1;
    }
    let mut i = 0;
    while i < NUM_COLUMNS {
        res.ep_file_keys[i] = generator.generate();
        i += 1;
    }
    res.side_to_move_key = generator.generate();
    res
};

impl Chessboard {
    pub(super) fn compute_zobrist(&self) -> Hashes {
        let mut pawns = PosHash(0);
        let mut nonpawns = [PosHash(0); NUM_COLORS];
        let mut special = PosHash(0);
        let mut knb = PosHash(0);
        for color in ChessColor::iter() {
            for piece in ChessPieceType::non_pawn_pieces() {
                let pieces = self.col_piece_bb(color, piece);
                for square in pieces.ones() {
                    let key = ZOBRIST_KEYS.piece_key(piece, color, square);
                    nonpawns[color] ^= key;
                    if piece.is_knb() {
                        knb ^= key;
                    }
                }
            }
            for square in self.col_piece_bb(color, Pawn).ones() {
                pawns ^= ZOBRIST_KEYS.piece_key(Pawn, color, square);
            }
        }
        special ^= self.ep_square.map_or(PosHash(0), |square| ZOBRIST_KEYS.ep_file_keys[square.file() as usize]);
        special ^= ZOBRIST_KEYS.castle_keys[self.castling.allowed_castling_directions()];
        if self.active == Black {
            special ^= ZOBRIST_KEYS.side_to_move_key;
        }
        Hashes { pawns, nonpawns, knb, total: pawns ^ nonpawns[0] ^ nonpawns[1] ^ special }
    }

    pub fn zobrist_delta(color: ChessColor, piece: ChessPieceType, from: ChessSquare, to: ChessSquare) -> PosHash {
        ZOBRIST_KEYS.piece_key(piece, color, to) ^ ZOBRIST_KEYS.piece_key(piece, color, from)
    }
}
