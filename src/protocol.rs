//! RVM valve command protocol.
//!
//! Protocol: point-to-point serial, 9600 baud, ASCII encoded.
//!
//! Every request is framed as `/1<COMMAND>\r`: the fixed device address `/1`,
//! the command body, and a carriage return. Replies are kept as raw bytes; the
//! driver does not decode the reply grammar.
//!
//! | Command | Body | Meaning |
//! |---|---|---|
//! | [`Command::Home`] | `ZR` | seek home/reference |
//! | [`Command::Abort`] | `T` | abort (semantics not documented by the vendor) |
//! | [`Command::Move`] | `b<N>R` / `i<N>R` / `o<N>R` | move to port N |
//! | [`Command::QueryPosition`] | `?6` | query current port |

use crate::error::{ValveError, ValveResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device address prefix of every frame.
pub const DEVICE_ADDRESS: &str = "/1";

/// Frame terminator.
pub const TERMINATOR: u8 = b'\r';

/// Baud rate of the valve's serial interface.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Port count of the standard 12-way valve head.
pub const DEFAULT_NUMBER_OF_PORTS: u32 = 12;

/// Wrap a command body into a wire frame.
///
/// Characters are encoded one byte each (Latin-1). Bodies containing characters
/// outside that range, or the terminator itself, are rejected.
pub fn frame(body: &str) -> ValveResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(DEVICE_ADDRESS.len() + body.len() + 1);
    bytes.extend_from_slice(DEVICE_ADDRESS.as_bytes());
    for ch in body.chars() {
        let byte = u8::try_from(u32::from(ch))
            .map_err(|_| ValveError::InvalidCommand(body.to_string()))?;
        if byte == TERMINATOR {
            return Err(ValveError::InvalidCommand(body.to_string()));
        }
        bytes.push(byte);
    }
    bytes.push(TERMINATOR);
    Ok(bytes)
}

// =============================================================================
// Direction
// =============================================================================

/// Rotation strategy for a move.
///
/// The numeric codes `0`, `1`, `2` are accepted on input for compatibility
/// with scripts written against the integer interface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Whichever way is shorter (`b`)
    #[default]
    Shortest,
    /// Increasing port numbers (`i`)
    Incremental,
    /// Decreasing port numbers (`o`)
    Decremental,
}

impl Direction {
    /// All directions, in code order.
    pub const ALL: [Direction; 3] = [
        Direction::Shortest,
        Direction::Incremental,
        Direction::Decremental,
    ];

    /// Mnemonic prefix for move commands.
    pub fn mnemonic(self) -> char {
        match self {
            Direction::Shortest => 'b',
            Direction::Incremental => 'i',
            Direction::Decremental => 'o',
        }
    }

    /// Numeric code (0 shortest, 1 incremental, 2 decremental).
    pub fn code(self) -> u8 {
        match self {
            Direction::Shortest => 0,
            Direction::Incremental => 1,
            Direction::Decremental => 2,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = ValveError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Direction::Shortest),
            1 => Ok(Direction::Incremental),
            2 => Ok(Direction::Decremental),
            other => Err(ValveError::InvalidDirection(other.to_string())),
        }
    }
}

impl FromStr for Direction {
    type Err = ValveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shortest" | "0" => Ok(Direction::Shortest),
            "incremental" | "1" => Ok(Direction::Incremental),
            "decremental" | "2" => Ok(Direction::Decremental),
            _ => Err(ValveError::InvalidDirection(s.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Shortest => "shortest",
            Direction::Incremental => "incremental",
            Direction::Decremental => "decremental",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Command
// =============================================================================

/// One request to the valve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Seek the home position.
    Home,
    /// Abort the current movement.
    Abort,
    /// Move to a port.
    Move {
        /// Target port (1-indexed)
        port: u32,
        /// Rotation strategy
        direction: Direction,
    },
    /// Ask the valve for its current port.
    QueryPosition,
    /// Arbitrary command body from the device manual.
    Raw(String),
}

impl Command {
    /// Command body without address prefix or terminator.
    pub fn body(&self) -> String {
        match self {
            Command::Home => "ZR".to_string(),
            Command::Abort => "T".to_string(),
            Command::Move { port, direction } => format!("{}{}R", direction.mnemonic(), port),
            Command::QueryPosition => "?6".to_string(),
            Command::Raw(body) => body.clone(),
        }
    }

    /// Full wire frame for this command.
    pub fn frame(&self) -> ValveResult<Vec<u8>> {
        frame(&self.body())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body())
    }
}

// =============================================================================
// Reply
// =============================================================================

/// Raw bytes read back after a command. Not decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply(Vec<u8>);

impl Reply {
    /// Wrap raw reply bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// True when nothing was waiting on the line.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw reply bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy text view of the reply.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Vec<u8>> for Reply {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}
