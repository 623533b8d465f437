//! RFC 3339 serde helpers for the optional timestamps the agent reports.
//!
//! Use with `#[serde(default, with = "crate::utils::time")]`.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Deserialize an optional RFC 3339 string into an OffsetDateTime.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(s) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    OffsetDateTime::parse(&s, &Rfc3339)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Serialize an optional OffsetDateTime, writing `null` when absent.
pub fn serialize<S>(datetime: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match datetime {
        Some(datetime) => {
            let s = datetime
                .format(&Rfc3339)
                .map_err(serde::ser::Error::custom)?;
            serializer.serialize_str(&s)
        }
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use time::macros::datetime;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Stamped {
        #[serde(default, with = "crate::utils::time")]
        at: Option<time::OffsetDateTime>,
    }

    #[test]
    fn parses_offsets_and_null() {
        let stamped: Stamped = serde_json::from_str(r#"{"at":"2024-05-01T12:00:00+02:00"}"#).unwrap();
        assert_eq!(stamped.at, Some(datetime!(2024-05-01 10:00:00 UTC)));
        let stamped: Stamped = serde_json::from_str(r#"{"at":null}"#).unwrap();
        assert_eq!(stamped.at, None);
        let stamped: Stamped = serde_json::from_str("{}").unwrap();
        assert_eq!(stamped.at, None);
    }

    #[test]
    fn rejects_non_rfc3339() {
        assert!(serde_json::from_str::<Stamped>(r#"{"at":"yesterday"}"#).is_err());
    }

    #[test]
    fn writes_rfc3339() {
        let stamped = Stamped {
            at: Some(datetime!(2024-05-01 12:00:00 UTC)),
        };
        assert_eq!(
            serde_json::to_string(&stamped).unwrap(),
            r#"{"at":"2024-05-01T12:00:00Z"}"#
        );
        assert_eq!(
            serde_json::to_string(&Stamped { at: None }).unwrap(),
            r#"{"at":null}"#
        );
    }
}
