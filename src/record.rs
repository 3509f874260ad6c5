//! Game-theoretic values, solved records and their packed storage form.

use std::fmt;

use crate::error::{Error, Result};

/// Value of a position for the player about to move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    /// Not solved yet. Packs to 0, which the store reads as "not found".
    Undecided,
    Lose,
    Win,
    Tie,
    Draw,
    /// A position the rules can never reach.
    Impossible,
}

impl Value {
    /// The same outcome seen by the other player.
    pub const fn flip(&self) -> Self {
        match self {
            Self::Win => Self::Lose,
            Self::Lose => Self::Win,
            other => *other,
        }
    }

    /// True for the values a solved position can take.
    pub const fn is_solved(&self) -> bool {
        !matches!(self, Self::Undecided | Self::Impossible)
    }
}

/// A solved position: its value and distance to a terminal position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Record {
    pub value: Value,
    pub remoteness: u32,
}

impl Record {
    pub const UNDECIDED: Record = Record::new(Value::Undecided, 0);

    pub const fn new(value: Value, remoteness: u32) -> Self {
        Self { value, remoteness }
    }

    /// Record of a primitive (terminal) position.
    pub const fn primitive(value: Value) -> Self {
        Self::new(value, 0)
    }

    /// What this record implies for a parent one move earlier.
    pub fn previous_position(&self) -> Self {
        Self::new(self.value.flip(), self.remoteness + 1)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} in {}", self.value, self.remoteness)
    }
}

/// Folds child records into their parent's record.
///
/// Children are seen from the child mover's side. A losing child makes the
/// parent a win reached as fast as possible; otherwise a tied or drawn child
/// makes it a tie deferred as long as possible; otherwise every move loses
/// and the loss is delayed as long as possible.
#[derive(Clone, Copy, Debug, Default)]
pub struct Combiner {
    fastest_lose: Option<u32>,
    slowest_tie: Option<u32>,
    slowest_win: Option<u32>,
    invalid: Option<Value>,
}

impl Combiner {
    pub fn push(&mut self, child: Record) {
        let r = child.remoteness;
        match child.value {
            Value::Lose => self.fastest_lose = Some(self.fastest_lose.map_or(r, |m| m.min(r))),
            Value::Tie | Value::Draw => {
                self.slowest_tie = Some(self.slowest_tie.map_or(r, |m| m.max(r)))
            }
            Value::Win => self.slowest_win = Some(self.slowest_win.map_or(r, |m| m.max(r))),
            other => self.invalid = Some(other),
        }
    }

    /// The parent's record. `Err` carries the first unsolved child value, or
    /// `Value::Undecided` when no child was pushed.
    pub fn finish(self) -> std::result::Result<Record, Value> {
        if let Some(value) = self.invalid {
            return Err(value);
        }
        if let Some(r) = self.fastest_lose {
            return Ok(Record::new(Value::Win, r + 1));
        }
        if let Some(r) = self.slowest_tie {
            return Ok(Record::new(Value::Tie, r + 1));
        }
        match self.slowest_win {
            Some(r) => Ok(Record::new(Value::Lose, r + 1)),
            None => Err(Value::Undecided),
        }
    }
}

/// [`Combiner`] over a slice.
pub fn combine(children: &[Record]) -> std::result::Result<Record, Value> {
    let mut combiner = Combiner::default();
    for &child in children {
        combiner.push(child);
    }
    combiner.finish()
}

/// Which values a game uses and how far remoteness can grow, which fixes the
/// packed record width.
///
/// A record packs as `tag + values * remoteness`, where `tag` is the value's
/// position in the enabled list. The list always starts with
/// [`Value::Undecided`], so 0 never denotes a solved record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordFormat {
    values: Vec<Value>,
    max_remoteness: u32,
}

impl RecordFormat {
    pub fn new(values: &[Value], max_remoteness: u32) -> Self {
        let mut enabled = vec![Value::Undecided];
        for &v in values {
            if !enabled.contains(&v) {
                enabled.push(v);
            }
        }
        Self {
            values: enabled,
            max_remoteness,
        }
    }

    /// Win, lose and tie.
    pub fn two_player(max_remoteness: u32) -> Self {
        Self::new(&[Value::Win, Value::Lose, Value::Tie], max_remoteness)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn max_remoteness(&self) -> u32 {
        self.max_remoteness
    }

    /// Number of distinct packed states.
    pub fn states(&self) -> u64 {
        self.values.len() as u64 * (self.max_remoteness as u64 + 1)
    }

    /// Bytes per stored record.
    pub fn width(&self) -> usize {
        let bits = 64 - (self.states() - 1).leading_zeros() as usize;
        bits.div_ceil(8).max(1)
    }

    /// Packed form, or `None` when the value is not enabled or the
    /// remoteness exceeds the bound.
    pub fn encode(&self, record: &Record) -> Option<u64> {
        if record.remoteness > self.max_remoteness {
            return None;
        }
        let tag = self.values.iter().position(|&v| v == record.value)? as u64;
        Some(tag + self.values.len() as u64 * record.remoteness as u64)
    }

    pub fn decode(&self, packed: u64) -> Result<Record> {
        if packed >= self.states() {
            return Err(Error::CorruptStore {
                reason: format!("packed record {packed} exceeds {} states", self.states()),
            });
        }
        let states = self.values.len() as u64;
        Ok(Record::new(
            self.values[(packed % states) as usize],
            (packed / states) as u32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_losing_child_wins_fastest() {
        let children = [
            Record::new(Value::Win, 0),
            Record::new(Value::Lose, 4),
            Record::new(Value::Tie, 7),
            Record::new(Value::Lose, 2),
        ];
        assert_eq!(combine(&children), Ok(Record::new(Value::Win, 3)));
    }

    #[test]
    fn ties_are_deferred() {
        let children = [
            Record::new(Value::Win, 9),
            Record::new(Value::Tie, 1),
            Record::new(Value::Draw, 5),
        ];
        assert_eq!(combine(&children), Ok(Record::new(Value::Tie, 6)));
    }

    #[test]
    fn forced_loss_is_delayed() {
        let children = [Record::new(Value::Win, 0), Record::new(Value::Win, 6)];
        assert_eq!(combine(&children), Ok(Record::new(Value::Lose, 7)));
    }

    #[test]
    fn unsolved_children_are_reported() {
        assert_eq!(combine(&[]), Err(Value::Undecided));
        let children = [Record::new(Value::Lose, 0), Record::UNDECIDED];
        assert_eq!(combine(&children), Err(Value::Undecided));
        let children = [Record::new(Value::Impossible, 0)];
        assert_eq!(combine(&children), Err(Value::Impossible));
    }

    #[test]
    fn packing() {
        let format = RecordFormat::two_player(9);
        assert_eq!(format.values().len(), 4);
        assert_eq!(format.width(), 1);
        assert_eq!(format.encode(&Record::UNDECIDED), Some(0));
        let record = Record::new(Value::Tie, 9);
        let packed = format.encode(&record).unwrap();
        assert_eq!(packed, 3 + 4 * 9);
        assert_eq!(format.decode(packed).unwrap(), record);
        assert_eq!(format.encode(&Record::new(Value::Draw, 1)), None);
        assert_eq!(format.encode(&Record::new(Value::Win, 10)), None);
        assert!(format.decode(40).is_err());
        assert_eq!(RecordFormat::two_player(100).width(), 2);
    }

    #[test]
    fn previous_position_flips() {
        let r = Record::new(Value::Lose, 0).previous_position();
        assert_eq!(r, Record::new(Value::Win, 1));
        assert_eq!(r.previous_position(), Record::new(Value::Lose, 2));
    }
}
