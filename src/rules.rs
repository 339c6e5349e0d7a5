//! Rules collaborator: legal moves, apply/undo, terminal status and FEN.
//!
//! The search and evaluator only talk to [`GameRules`]. [`ChessRules`] is the
//! production implementation on top of the `chess` crate; it keeps an undo
//! stack of board snapshots so `apply` followed by `undo` is exact.
//!
//! ```rust
//! use chess_tier_engine::rules::{ChessRules, GameRules};
//!
//! let mut rules = ChessRules::new();
//! let e4 = rules.find_move("e2e4").unwrap();
//! assert_eq!(e4.san, "e4");
//! rules.apply(&e4).unwrap();
//! rules.undo();
//! assert_eq!(rules.to_fen(), ChessRules::new().to_fen());
//! ```

use chess::{Board, BoardStatus, ChessMove, Color, File, MoveGen, Piece, Square, EMPTY};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use crate::errors::Result;
use crate::{engine_fault, invalid_position};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// A legal move as produced by the rules collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Piece>,
    pub san: String,
    pub captured: Option<Piece>,
}

impl Move {
    /// Coordinate notation: `e2e4`, `e7e8q`
    pub fn coordinate(&self) -> String {
        match self.promotion {
            Some(piece) => format!("{}{}{}", self.from, self.to, piece_char(piece)),
            None => format!("{}{}", self.from, self.to),
        }
    }

    /// Tiers use different notations; only the from/to/promotion tuple is compared.
    pub fn same_action(&self, other: &Move) -> bool {
        self.from == other.from && self.to == other.to && self.promotion == other.promotion
    }

    pub fn matches_token(&self, token: &str) -> bool {
        let token = token.trim();
        self.san == token
            || self.san.trim_end_matches(['+', '#']) == token.trim_end_matches(['+', '#'])
            || self.coordinate().eq_ignore_ascii_case(token)
            || self.king_takes_rook().is_some_and(|encoded| encoded == token)
    }

    /// King-takes-rook castling encoding used by some analysis services (`e1h1`)
    fn king_takes_rook(&self) -> Option<String> {
        let rook_file = if self.san.starts_with("O-O-O") {
            'a'
        } else if self.san.starts_with("O-O") {
            'h'
        } else {
            return None;
        };
        Some(format!(
            "{}{}{}",
            self.from,
            rook_file,
            self.from.get_rank().to_index() + 1
        ))
    }

    pub fn as_chess_move(&self) -> ChessMove {
        ChessMove::new(self.from, self.to, self.promotion)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.san)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    Stalemate,
    ThreefoldRepetition,
    FiftyMoveRule,
    InsufficientMaterial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    /// The side to move is checkmated
    Checkmate,
    Draw(DrawReason),
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GameStatus::Ongoing)
    }

    /// Status line for display; `in_check` only matters for ongoing games.
    pub fn describe(&self, side_to_move: Color, in_check: bool) -> String {
        match self {
            GameStatus::Checkmate => {
                let winner = match side_to_move {
                    Color::White => "Black",
                    Color::Black => "White",
                };
                format!("Checkmate! {} wins!", winner)
            }
            GameStatus::Draw(_) => "Draw!".to_string(),
            GameStatus::Ongoing if in_check => "Check!".to_string(),
            GameStatus::Ongoing => String::new(),
        }
    }
}

/// Capability the engine core needs from a chess rules implementation
pub trait GameRules {
    /// Legal moves in a stable, implementation-defined order
    fn legal_moves(&self) -> Vec<Move>;
    /// Same moves and order as `legal_moves`, but `san` may be left empty.
    /// Search interiors only need the action, so implementations can skip notation.
    fn search_moves(&self) -> Vec<Move> {
        self.legal_moves()
    }
    fn apply(&mut self, mv: &Move) -> Result<()>;
    /// Reverts the most recent `apply`. Returns `None` when nothing was applied.
    fn undo(&mut self) -> Option<Move>;
    fn status(&self) -> GameStatus;
    fn side_to_move(&self) -> Color;
    fn piece_at(&self, square: Square) -> Option<(Piece, Color)>;
    fn to_fen(&self) -> String;
}

/// Applies a move for the lifetime of the guard and undoes it on drop.
pub struct MoveGuard<'a, R: GameRules + ?Sized> {
    rules: &'a mut R,
}

impl<'a, R: GameRules + ?Sized> MoveGuard<'a, R> {
    pub fn apply(rules: &'a mut R, mv: &Move) -> Result<Self> {
        rules.apply(mv)?;
        Ok(Self { rules })
    }
}

impl<R: GameRules + ?Sized> Deref for MoveGuard<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.rules
    }
}

impl<R: GameRules + ?Sized> DerefMut for MoveGuard<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.rules
    }
}

impl<R: GameRules + ?Sized> Drop for MoveGuard<'_, R> {
    fn drop(&mut self) {
        self.rules.undo();
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
    mv: Move,
}

/// [`GameRules`] backed by `chess::Board`
#[derive(Debug, Clone)]
pub struct ChessRules {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
    /// Hashes of every position since construction, current one last
    hashes: Vec<u64>,
    undo_stack: Vec<Snapshot>,
}

impl Default for ChessRules {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessRules {
    pub fn new() -> Self {
        Self::from_board(Board::default(), 0, 1)
    }

    pub fn from_fen(fen: &str) -> Result<Self> {
        let board = Board::from_str(fen.trim())
            .map_err(|e| invalid_position!("{}: {}", fen, e))?;

        let fields: Vec<&str> = fen.split_whitespace().collect();
        let halfmove_clock = fields.get(4).and_then(|f| f.parse::<u32>().ok()).unwrap_or(0);
        let fullmove_number = fields
            .get(5)
            .and_then(|f| f.parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);

        Ok(Self::from_board(board, halfmove_clock, fullmove_number))
    }

    fn from_board(board: Board, halfmove_clock: u32, fullmove_number: u32) -> Self {
        Self {
            board,
            halfmove_clock,
            fullmove_number,
            hashes: vec![board.get_hash()],
            undo_stack: Vec::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn in_check(&self) -> bool {
        *self.board.checkers() != EMPTY
    }

    /// Number of moves currently applied on top of the initial position
    pub fn ply(&self) -> usize {
        self.undo_stack.len()
    }

    /// Resolve a coordinate (`e2e4`) or SAN (`Nf3`) token against the legal moves.
    pub fn find_move(&self, token: &str) -> Option<Move> {
        self.legal_moves()
            .into_iter()
            .find(|mv| mv.matches_token(token))
    }

    /// Colour-swapped, rank-flipped copy of this position.
    pub fn mirrored(&self) -> Result<Self> {
        Self::from_fen(&mirror_fen(&self.to_fen()))
    }

    fn describe(&self, chess_move: ChessMove, legal: &[ChessMove]) -> Move {
        Move {
            from: chess_move.get_source(),
            to: chess_move.get_dest(),
            promotion: chess_move.get_promotion(),
            san: san_for(&self.board, chess_move, legal),
            captured: captured_piece(&self.board, chess_move),
        }
    }

    fn is_insufficient_material(&self) -> bool {
        let kings = *self.board.pieces(Piece::King);
        let others = *self.board.combined() & !kings;

        match others.popcnt() {
            0 => true,
            1 => {
                let minors = *self.board.pieces(Piece::Knight) | *self.board.pieces(Piece::Bishop);
                (others & minors) != EMPTY
            }
            _ => {
                // Bishops only, all on the same square colour
                let bishops = *self.board.pieces(Piece::Bishop);
                if others != bishops {
                    return false;
                }
                let mut colours = bishops.map(|sq| (sq.get_rank().to_index() + sq.get_file().to_index()) % 2);
                match colours.next() {
                    Some(first) => colours.all(|c| c == first),
                    None => false,
                }
            }
        }
    }

    fn repetition_count(&self) -> usize {
        let current = self.board.get_hash();
        self.hashes.iter().filter(|&&h| h == current).count()
    }
}

impl GameRules for ChessRules {
    fn legal_moves(&self) -> Vec<Move> {
        let legal: Vec<ChessMove> = MoveGen::new_legal(&self.board).collect();
        legal.iter().map(|&m| self.describe(m, &legal)).collect()
    }

    fn search_moves(&self) -> Vec<Move> {
        MoveGen::new_legal(&self.board)
            .map(|m| Move {
                from: m.get_source(),
                to: m.get_dest(),
                promotion: m.get_promotion(),
                san: String::new(),
                captured: captured_piece(&self.board, m),
            })
            .collect()
    }

    fn apply(&mut self, mv: &Move) -> Result<()> {
        let chess_move = mv.as_chess_move();
        if !self.board.legal(chess_move) {
            return Err(engine_fault!(
                "illegal move {} in {}",
                mv.coordinate(),
                self.to_fen()
            ));
        }

        let resets_clock = self.board.piece_on(mv.from) == Some(Piece::Pawn)
            || captured_piece(&self.board, chess_move).is_some();

        self.undo_stack.push(Snapshot {
            board: self.board,
            halfmove_clock: self.halfmove_clock,
            fullmove_number: self.fullmove_number,
            mv: mv.clone(),
        });

        if self.board.side_to_move() == Color::Black {
            self.fullmove_number += 1;
        }
        self.halfmove_clock = if resets_clock { 0 } else { self.halfmove_clock + 1 };
        self.board = self.board.make_move_new(chess_move);
        self.hashes.push(self.board.get_hash());
        Ok(())
    }

    fn undo(&mut self) -> Option<Move> {
        let snapshot = self.undo_stack.pop()?;
        self.board = snapshot.board;
        self.halfmove_clock = snapshot.halfmove_clock;
        self.fullmove_number = snapshot.fullmove_number;
        self.hashes.pop();
        Some(snapshot.mv)
    }

    fn status(&self) -> GameStatus {
        match self.board.status() {
            BoardStatus::Checkmate => return GameStatus::Checkmate,
            BoardStatus::Stalemate => return GameStatus::Draw(DrawReason::Stalemate),
            BoardStatus::Ongoing => {}
        }

        if self.is_insufficient_material() {
            GameStatus::Draw(DrawReason::InsufficientMaterial)
        } else if self.repetition_count() >= 3 {
            GameStatus::Draw(DrawReason::ThreefoldRepetition)
        } else if self.halfmove_clock >= 100 {
            GameStatus::Draw(DrawReason::FiftyMoveRule)
        } else {
            GameStatus::Ongoing
        }
    }

    fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    fn piece_at(&self, square: Square) -> Option<(Piece, Color)> {
        let piece = self.board.piece_on(square)?;
        let color = self.board.color_on(square)?;
        Some((piece, color))
    }

    fn to_fen(&self) -> String {
        // chess::Board always prints "0 1" for the clocks
        let rendered = self.board.to_string();
        let fields: Vec<&str> = rendered.split_whitespace().take(4).collect();
        format!(
            "{} {} {}",
            fields.join(" "),
            self.halfmove_clock,
            self.fullmove_number
        )
    }
}

fn piece_char(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'p',
        Piece::Knight => 'n',
        Piece::Bishop => 'b',
        Piece::Rook => 'r',
        Piece::Queen => 'q',
        Piece::King => 'k',
    }
}

fn captured_piece(board: &Board, chess_move: ChessMove) -> Option<Piece> {
    if let Some(piece) = board.piece_on(chess_move.get_dest()) {
        return Some(piece);
    }
    // En passant: pawn changes file onto an empty square
    let is_pawn = board.piece_on(chess_move.get_source()) == Some(Piece::Pawn);
    let changes_file = chess_move.get_source().get_file() != chess_move.get_dest().get_file();
    if is_pawn && changes_file {
        Some(Piece::Pawn)
    } else {
        None
    }
}

fn san_for(board: &Board, chess_move: ChessMove, legal: &[ChessMove]) -> String {
    let from = chess_move.get_source();
    let to = chess_move.get_dest();
    let piece = board.piece_on(from).unwrap_or(Piece::Pawn);
    let mut san = String::new();

    let file_distance = from.get_file().to_index().abs_diff(to.get_file().to_index());
    if piece == Piece::King && file_distance == 2 {
        san.push_str(if to.get_file() == File::G { "O-O" } else { "O-O-O" });
    } else {
        let is_capture = captured_piece(board, chess_move).is_some();

        if piece == Piece::Pawn {
            if is_capture {
                san.push_str(&from.to_string()[..1]);
            }
        } else {
            san.push(piece_char(piece).to_ascii_uppercase());

            let rivals: Vec<Square> = legal
                .iter()
                .filter(|m| {
                    m.get_dest() == to
                        && m.get_source() != from
                        && board.piece_on(m.get_source()) == Some(piece)
                })
                .map(|m| m.get_source())
                .collect();

            if !rivals.is_empty() {
                let same_file = rivals.iter().any(|s| s.get_file() == from.get_file());
                let same_rank = rivals.iter().any(|s| s.get_rank() == from.get_rank());
                let square = from.to_string();
                match (same_file, same_rank) {
                    (false, _) => san.push_str(&square[..1]),
                    (true, false) => san.push_str(&square[1..]),
                    (true, true) => san.push_str(&square),
                }
            }
        }

        if is_capture {
            san.push('x');
        }
        san.push_str(&to.to_string());

        if let Some(promotion) = chess_move.get_promotion() {
            san.push('=');
            san.push(piece_char(promotion).to_ascii_uppercase());
        }
    }

    let after = board.make_move_new(chess_move);
    match after.status() {
        BoardStatus::Checkmate => san.push('#'),
        _ if *after.checkers() != EMPTY => san.push('+'),
        _ => {}
    }

    san
}

/// Swap colours and flip ranks of a FEN position.
pub fn mirror_fen(fen: &str) -> String {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let swap_case = |c: char| {
        if c.is_ascii_uppercase() {
            c.to_ascii_lowercase()
        } else {
            c.to_ascii_uppercase()
        }
    };

    let placement = fields
        .first()
        .map(|p| {
            p.split('/')
                .rev()
                .map(|rank| rank.chars().map(swap_case).collect::<String>())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    let side = match fields.get(1) {
        Some(&"b") => "w",
        _ => "b",
    };

    let castling = match fields.get(2) {
        Some(&"-") | None => "-".to_string(),
        Some(rights) => {
            let swapped: String = rights.chars().map(swap_case).collect();
            // Keep canonical KQkq ordering
            let mut ordered = String::new();
            for c in ['K', 'Q', 'k', 'q'] {
                if swapped.contains(c) {
                    ordered.push(c);
                }
            }
            ordered
        }
    };

    let en_passant = match fields.get(3) {
        Some(&"-") | None => "-".to_string(),
        Some(square) => square
            .chars()
            .map(|c| match c {
                '3' => '6',
                '6' => '3',
                other => other,
            })
            .collect(),
    };

    let halfmove = fields.get(4).copied().unwrap_or("0");
    let fullmove = fields.get(5).copied().unwrap_or("1");

    format!(
        "{} {} {} {} {} {}",
        placement, side, castling, en_passant, halfmove, fullmove
    )
}
