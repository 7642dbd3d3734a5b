use crate::{
    Result,
    constants::{MAX_DEVICE_NUMBER, MIN_DEVICE_NUMBER},
    error::Error,
};
use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card code extracted from a validated Wiegand frame.
///
/// Persisted as a decimal string (`"card": "1234567"`) so records written by
/// older controllers stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardCode(u64);

impl CardCode {
    /// Wrap a raw card value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        CardCode(value)
    }

    /// Get the raw card value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CardCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidCardCode(s.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(CardCode)
            .map_err(|_| Error::InvalidCardCode(s.to_string()))
    }
}

impl TryFrom<String> for CardCode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CardCode> for String {
    fn from(code: CardCode) -> Self {
        code.to_string()
    }
}

fn check_device_number(value: u8) -> bool {
    (MIN_DEVICE_NUMBER..=MAX_DEVICE_NUMBER).contains(&value)
}

/// Physical reader number (1-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ReaderId(u8);

impl ReaderId {
    /// Create a reader ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidReaderId` if the ID is outside 1-8.
    pub fn new(id: u8) -> Result<Self> {
        if !check_device_number(id) {
            return Err(Error::InvalidReaderId {
                value: id.to_string(),
            });
        }
        Ok(ReaderId(id))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Relay wired to this reader's door.
    ///
    /// Readers map to the relay with the same number; a reader beyond the
    /// last installed relay shares the last one.
    #[must_use]
    pub fn relay(&self, relay_count: u8) -> RelayId {
        let last = relay_count.clamp(MIN_DEVICE_NUMBER, MAX_DEVICE_NUMBER);
        RelayId(self.0.min(last))
    }
}

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReaderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id: u8 = s.trim().parse().map_err(|_| Error::InvalidReaderId {
            value: s.to_string(),
        })?;
        ReaderId::new(id)
    }
}

impl TryFrom<u8> for ReaderId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        ReaderId::new(id)
    }
}

impl From<ReaderId> for u8 {
    fn from(id: ReaderId) -> Self {
        id.0
    }
}

/// Door relay number (1-8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RelayId(u8);

impl RelayId {
    /// Create a relay ID with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidRelayId` if the ID is outside 1-8.
    pub fn new(id: u8) -> Result<Self> {
        if !check_device_number(id) {
            return Err(Error::InvalidRelayId {
                value: id.to_string(),
            });
        }
        Ok(RelayId(id))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for RelayId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        RelayId::new(id)
    }
}

impl From<RelayId> for u8 {
    fn from(id: RelayId) -> Self {
        id.0
    }
}

/// Outcome of an access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessStatus {
    #[serde(rename = "Access Granted")]
    Granted,
    #[serde(rename = "Access Denied")]
    Denied,
    #[serde(rename = "Blocked")]
    Blocked,
}

impl AccessStatus {
    /// Label used in persisted records and exports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AccessStatus::Granted => "Access Granted",
            AccessStatus::Denied => "Access Denied",
            AccessStatus::Blocked => "Blocked",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, AccessStatus::Granted)
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable record of one access event.
///
/// Timestamps have whole-second resolution, so a record read back from disk
/// compares equal to the one that was written.
///
/// Serialized compactly as
/// `{"name":..,"card":"..","reader":1,"status":"Access Granted","timestamp":1700000000}`,
/// the same shape in daily files and in the failure cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub name: String,
    pub card: CardCode,
    pub reader: ReaderId,
    pub status: AccessStatus,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        name: impl Into<String>,
        card: CardCode,
        reader: ReaderId,
        status: AccessStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            card,
            reader,
            status,
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
        }
    }

    /// Calendar day (controller local time) the transaction belongs to.
    #[must_use]
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.with_timezone(&Local).date_naive()
    }

    /// Serialize as one compact JSON line (no trailing newline).
    ///
    /// # Errors
    /// Returns `Error::Json` if serialization fails.
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Directory entry for one card holder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ref_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    #[serde(default)]
    pub privacy_protected: bool,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = ref_id.into();
        self
    }

    pub fn with_privacy(mut self, enabled: bool) -> Self {
        self.privacy_protected = enabled;
        self
    }
}

/// Per-day access counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TodayCounts {
    pub granted: u64,
    pub denied: u64,
    pub blocked: u64,
    pub total: u64,
}

impl TodayCounts {
    /// Count one more transaction with the given status.
    pub fn record(&mut self, status: AccessStatus) {
        match status {
            AccessStatus::Granted => self.granted += 1,
            AccessStatus::Denied => self.denied += 1,
            AccessStatus::Blocked => self.blocked += 1,
        }
        self.total = self.granted + self.denied + self.blocked;
    }
}

/// Administrative relay command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayAction {
    /// Clear any hold and return the relay to automatic control.
    Normal,
    /// Hold the door open until cleared.
    OpenHold,
    /// Hold the door closed until cleared.
    CloseHold,
}

impl std::str::FromStr for RelayAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "normal" => Ok(RelayAction::Normal),
            "open_hold" => Ok(RelayAction::OpenHold),
            "close_hold" => Ok(RelayAction::CloseHold),
            other => Err(Error::InvalidRelayAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("1234567", 1_234_567)]
    #[case(" 42 ", 42)]
    #[case("0", 0)]
    fn test_card_code_parse(#[case] input: &str, #[case] expected: u64) {
        let code: CardCode = input.parse().unwrap();
        assert_eq!(code.value(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("12a4")]
    #[case("-5")]
    #[case("99999999999999999999999")]
    fn test_card_code_invalid(#[case] input: &str) {
        assert!(input.parse::<CardCode>().is_err());
    }

    #[rstest]
    #[case(1)]
    #[case(8)]
    fn test_reader_id_valid(#[case] id: u8) {
        assert_eq!(ReaderId::new(id).unwrap().as_u8(), id);
    }

    #[rstest]
    #[case(0)]
    #[case(9)]
    fn test_reader_id_invalid(#[case] id: u8) {
        assert!(ReaderId::new(id).is_err());
        assert!(RelayId::new(id).is_err());
    }

    #[test]
    fn test_reader_relay_mapping() {
        assert_eq!(ReaderId::new(1).unwrap().relay(3).as_u8(), 1);
        assert_eq!(ReaderId::new(3).unwrap().relay(3).as_u8(), 3);
        assert_eq!(ReaderId::new(5).unwrap().relay(3).as_u8(), 3);
    }

    #[test]
    fn test_transaction_json_shape() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let tx = Transaction::new(
            "Alice",
            CardCode::new(123),
            ReaderId::new(2).unwrap(),
            AccessStatus::Granted,
            ts,
        );

        let line = tx.to_json_line().unwrap();
        assert_eq!(
            line,
            r#"{"name":"Alice","card":"123","reader":2,"status":"Access Granted","timestamp":1700000000}"#
        );

        let parsed: Transaction = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, tx);
    }

    #[test]
    fn test_transaction_truncates_to_seconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 750_000_000).unwrap();
        let tx = Transaction::new(
            "Bob",
            CardCode::new(1),
            ReaderId::new(1).unwrap(),
            AccessStatus::Denied,
            ts,
        );
        assert_eq!(tx.timestamp.timestamp_subsec_nanos(), 0);
        let parsed: Transaction = serde_json::from_str(&tx.to_json_line().unwrap()).unwrap();
        assert_eq!(parsed, tx);
    }

    #[test]
    fn test_transaction_rejects_bad_reader() {
        let line = r#"{"name":"x","card":"1","reader":0,"status":"Blocked","timestamp":1}"#;
        assert!(serde_json::from_str::<Transaction>(line).is_err());
    }

    #[test]
    fn test_user_record_defaults() {
        let record: UserRecord = serde_json::from_str(r#"{"name":"Bob"}"#).unwrap();
        assert_eq!(record.name, "Bob");
        assert!(!record.privacy_protected);
        assert!(record.id.is_empty());
    }

    #[test]
    fn test_today_counts_record() {
        let mut counts = TodayCounts::default();
        counts.record(AccessStatus::Granted);
        counts.record(AccessStatus::Granted);
        counts.record(AccessStatus::Blocked);
        assert_eq!(counts.granted, 2);
        assert_eq!(counts.blocked, 1);
        assert_eq!(counts.denied, 0);
        assert_eq!(counts.total, 3);
    }

    #[rstest]
    #[case("normal", RelayAction::Normal)]
    #[case("open_hold", RelayAction::OpenHold)]
    #[case("close_hold", RelayAction::CloseHold)]
    fn test_relay_action_parse(#[case] input: &str, #[case] expected: RelayAction) {
        assert_eq!(input.parse::<RelayAction>().unwrap(), expected);
    }

    #[test]
    fn test_relay_action_rejects_rfid_pulse() {
        // Automatic pulses are never an administrative command
        assert!("normal_rfid".parse::<RelayAction>().is_err());
    }
}
