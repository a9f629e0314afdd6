//! Shared value types: type tags, request status, decisions and timestamps
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::ValidationError;

/// Category label shared by requester roles, request types and approver permissions.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum TypeTag {
    #[n(0)]
    A,
    #[n(1)]
    B,
    #[n(2)]
    C,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

/// Outcome an approver applies to a pending request. Approving is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    #[default]
    Approve,
    Reject,
}

/// UTC wall-clock instant, persisted as `[seconds, subsecond nanos]` since the epoch.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TypeTag {
    pub const ALL: [TypeTag; 3] = [TypeTag::A, TypeTag::B, TypeTag::C];

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::A => "A",
            TypeTag::B => "B",
            TypeTag::C => "C",
        }
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Approved => "APPROVED",
            Status::Rejected => "REJECTED",
        }
    }
    /// Approved and rejected requests never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Pending)
    }
}

impl Decision {
    pub fn target_status(&self) -> Status {
        match self {
            Decision::Approve => Status::Approved,
            Decision::Reject => Status::Rejected,
        }
    }
}

impl From<bool> for Decision {
    fn from(approve: bool) -> Self {
        if approve {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }
}

impl TimeStamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    /// Panics on an impossible calendar date; intended for fixtures and tests.
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    /// An instant offset from the current wall clock; negative offsets land in the past.
    pub fn from_now(offset: Duration) -> Self {
        Self(Utc::now() + offset)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl FromStr for TypeTag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(TypeTag::A),
            "B" => Ok(TypeTag::B),
            "C" => Ok(TypeTag::C),
            other => Err(ValidationError::UnknownTypeTag(other.to_string())),
        }
    }
}

impl FromStr for Status {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PENDING" => Ok(Status::Pending),
            "APPROVED" => Ok(Status::Approved),
            "REJECTED" => Ok(Status::Rejected),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(2)?
            .i64(self.0.timestamp())?
            .u32(self.0.timestamp_subsec_nanos())?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        if d.array()? != Some(2) {
            return Err(minicbor::decode::Error::message(
                "expected timestamp as [seconds, nanoseconds]",
            ));
        }
        let secs = d.i64()?;
        let nsecs = d.u32()?;

        DateTime::from_timestamp(secs, nsecs)
            .map(TimeStamp)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert timestamp to utc",
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::now();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamp_encoding_covers_far_dates() {
        let far = [
            TimeStamp::new_with(9999, 12, 31, 23, 59, 59),
            TimeStamp::new_with(2300, 1, 1, 0, 0, 0),
            TimeStamp::new_with(1600, 1, 1, 0, 0, 0),
        ];
        for original in far {
            let encoding = minicbor::to_vec(original).unwrap();
            let decode: TimeStamp = minicbor::decode(&encoding).unwrap();
            assert_eq!(original, decode);
        }
    }

    #[test]
    fn type_tag_text_form() {
        for tag in TypeTag::ALL {
            assert_eq!(tag.to_string().parse::<TypeTag>().unwrap(), tag);
        }
        assert!(matches!(
            "D".parse::<TypeTag>(),
            Err(ValidationError::UnknownTypeTag(s)) if s == "D"
        ));
    }

    #[test]
    fn status_text_form_matches_relation_values() {
        assert_eq!(Status::Pending.to_string(), "PENDING");
        assert_eq!("APPROVED".parse::<Status>().unwrap(), Status::Approved);
        assert!("approved".parse::<Status>().is_err());
    }

    #[test]
    fn decision_defaults_to_approve() {
        assert_eq!(Decision::default(), Decision::Approve);
        assert_eq!(Decision::from(false), Decision::Reject);
        assert_eq!(Decision::Reject.target_status(), Status::Rejected);
        assert!(!Status::Pending.is_terminal());
        assert!(Status::Approved.is_terminal());
    }

    #[test]
    fn from_now_orders_around_the_clock() {
        let past = TimeStamp::from_now(Duration::seconds(-60));
        let future = TimeStamp::from_now(Duration::seconds(60));
        assert!(past < TimeStamp::now());
        assert!(future > TimeStamp::now());
    }
}
