//! Wire format shared by the server and clients.
//!
//! Every datagram carries exactly one [`Update`] encoded as ASCII text:
//!
//! ```text
//! kind(1 digit) player(1 digit) movement(1 digit) direction(1 digit) timestamp(digits) name(rest)
//! ```
//!
//! There is no length prefix, checksum or version field. Existing clients
//! send zero-padded fixed-size buffers, so a payload ends at its first NUL
//! byte. A display name that begins with a digit cannot be told apart from
//! the timestamp, and names cut off by the 64-byte receive buffer are lost
//! silently. Both are limits of the deployed protocol.

use thiserror::Error;

/// Size of the receive buffer; longer datagrams are truncated by the socket.
pub const MAX_DATAGRAM_SIZE: usize = 64;

/// Largest player id the one-digit wire field can carry.
pub const MAX_PLAYER_ID: u8 = 9;

/// Default UDP port the game clients talk to.
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Movement,
    Registration,
}

impl UpdateKind {
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(UpdateKind::Movement),
            1 => Some(UpdateKind::Registration),
            _ => None,
        }
    }

    pub fn digit(self) -> u8 {
        match self {
            UpdateKind::Movement => 0,
            UpdateKind::Registration => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MovementState {
    #[default]
    Idle,
    Moving,
}

impl MovementState {
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            0 => Some(MovementState::Idle),
            1 => Some(MovementState::Moving),
            _ => None,
        }
    }

    pub fn digit(self) -> u8 {
        match self {
            MovementState::Idle => 0,
            MovementState::Moving => 1,
        }
    }
}

/// Heading of a tank. North is +y and east is +x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    None,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthWest,
    SouthEast,
}

impl Direction {
    pub const ALL: [Direction; 9] = [
        Direction::None,
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthWest,
        Direction::SouthEast,
    ];

    pub fn from_digit(digit: u8) -> Option<Self> {
        Self::ALL.get(digit as usize).copied()
    }

    pub fn digit(self) -> u8 {
        match self {
            Direction::None => 0,
            Direction::North => 1,
            Direction::South => 2,
            Direction::East => 3,
            Direction::West => 4,
            Direction::NorthEast => 5,
            Direction::NorthWest => 6,
            Direction::SouthWest => 7,
            Direction::SouthEast => 8,
        }
    }

    /// Unit step along each axis, as `(x, y)`.
    pub fn offset(self) -> (i8, i8) {
        match self {
            Direction::None => (0, 0),
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, 1),
            Direction::NorthWest => (-1, 1),
            Direction::SouthWest => (-1, -1),
            Direction::SouthEast => (1, -1),
        }
    }
}

/// One client's state sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub kind: UpdateKind,
    pub player_id: u8,
    pub movement: MovementState,
    pub direction: Direction,
    pub timestamp: u32,
    /// Only carried by registrations; empty otherwise.
    pub display_name: String,
}

impl Update {
    pub fn registration(player_id: u8, display_name: impl Into<String>, timestamp: u32) -> Self {
        Self {
            kind: UpdateKind::Registration,
            player_id,
            movement: MovementState::Idle,
            direction: Direction::None,
            timestamp,
            display_name: display_name.into(),
        }
    }

    pub fn movement(
        player_id: u8,
        movement: MovementState,
        direction: Direction,
        timestamp: u32,
    ) -> Self {
        Self {
            kind: UpdateKind::Movement,
            player_id,
            movement,
            direction,
            timestamp,
            display_name: String::new(),
        }
    }

    pub fn is_registration(&self) -> bool {
        self.kind == UpdateKind::Registration
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,
    #[error("datagram too short ({0} bytes)")]
    Truncated(usize),
    #[error("non-digit byte {byte:#04x} in {field} field")]
    NotADigit { field: &'static str, byte: u8 },
    #[error("unknown update kind {0}")]
    UnknownKind(u8),
    #[error("unknown movement state {0}")]
    UnknownMovement(u8),
    #[error("unknown direction {0}")]
    UnknownDirection(u8),
    #[error("missing timestamp")]
    MissingTimestamp,
    #[error("timestamp does not fit in 32 bits")]
    TimestampOverflow,
}

const HEADER_LEN: usize = 4;

fn digit(byte: u8, field: &'static str) -> Result<u8, DecodeError> {
    if byte.is_ascii_digit() {
        Ok(byte - b'0')
    } else {
        Err(DecodeError::NotADigit { field, byte })
    }
}

/// Parses one datagram payload.
pub fn decode(bytes: &[u8]) -> Result<Update, DecodeError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let data = &bytes[..end];

    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(data.len()));
    }

    let kind = digit(data[0], "kind")?;
    let kind = UpdateKind::from_digit(kind).ok_or(DecodeError::UnknownKind(kind))?;
    let player_id = digit(data[1], "player")?;
    let movement = digit(data[2], "movement")?;
    let movement =
        MovementState::from_digit(movement).ok_or(DecodeError::UnknownMovement(movement))?;
    let direction = digit(data[3], "direction")?;
    let direction =
        Direction::from_digit(direction).ok_or(DecodeError::UnknownDirection(direction))?;

    let rest = &data[HEADER_LEN..];
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Err(DecodeError::MissingTimestamp);
    }

    let timestamp = rest[..digits].iter().try_fold(0u32, |acc, &b| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u32::from(b - b'0')))
            .ok_or(DecodeError::TimestampOverflow)
    })?;

    let display_name = match kind {
        UpdateKind::Registration => String::from_utf8_lossy(&rest[digits..]).into_owned(),
        UpdateKind::Movement => String::new(),
    };

    Ok(Update {
        kind,
        player_id,
        movement,
        direction,
        timestamp,
        display_name,
    })
}

/// Serializes an update into its wire form.
///
/// The player id must fit the one-digit field (at most [`MAX_PLAYER_ID`]).
/// Every decoded update satisfies this.
pub fn encode(update: &Update) -> Vec<u8> {
    debug_assert!(
        update.player_id <= MAX_PLAYER_ID,
        "player id {} does not fit the wire format",
        update.player_id
    );
    let mut out = Vec::with_capacity(HEADER_LEN + 10 + update.display_name.len());
    out.push(b'0' + update.kind.digit());
    out.push(b'0' + update.player_id);
    out.push(b'0' + update.movement.digit());
    out.push(b'0' + update.direction.digit());
    out.extend_from_slice(update.timestamp.to_string().as_bytes());
    if update.is_registration() {
        out.extend_from_slice(update.display_name.as_bytes());
    }
    out
}
