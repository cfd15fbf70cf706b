use std::str::FromStr;

use crate::error::RequestError;

const SINGLE: char = '-';
const STREAM: char = '=';

/// Parsed `<2 chars><mode><schema>` event name, e.g. `db-userbase` or
/// `db=userbase`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTag
{
    name: String,
    streaming: bool,
    schema: String,
}

impl EventTag
{
    pub fn parse(name: &str) -> Result<EventTag, RequestError>
    {
        let mut chars = name.char_indices().skip(2);
        let Some((idx, mode)) = chars.next() else {
            return Err(RequestError::EventShape(name.to_string()));
        };
        let streaming = match mode {
            SINGLE => false,
            STREAM => true,
            other => return Err(RequestError::Mode {
                event: name.to_string(),
                mode: other,
            }),
        };

        let schema = &name[idx + mode.len_utf8()..];
        if !is_valid_schema(schema) {
            return Err(RequestError::Schema(schema.to_string()));
        }

        Ok(EventTag {
            name: name.to_string(),
            streaming,
            schema: schema.to_string(),
        })
    }

    /// The exact event name, echoed back on every non-exception message.
    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn is_streaming(&self) -> bool
    {
        self.streaming
    }

    pub fn schema(&self) -> &str
    {
        &self.schema
    }
}

impl FromStr for EventTag
{
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        EventTag::parse(s)
    }
}

impl std::fmt::Display for EventTag
{
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
    {
        write!(f, "{}", self.name)
    }
}

fn is_valid_schema(schema: &str) -> bool
{
    !schema.is_empty()
        && schema.chars().all(|c| c.is_ascii_alphanumeric())
        && !schema.contains(std::path::MAIN_SEPARATOR)
        && !schema.contains('/')
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_single_and_streaming_modes()
    {
        let single = EventTag::parse("db-userbase").unwrap();
        assert!(!single.is_streaming());
        assert_eq!(single.schema(), "userbase");
        assert_eq!(single.name(), "db-userbase");

        let stream: EventTag = "db=oneliners".parse().unwrap();
        assert!(stream.is_streaming());
        assert_eq!(stream.schema(), "oneliners");
    }

    #[test]
    fn prefix_is_free_form()
    {
        let tag = EventTag::parse("☃!-msgs2").unwrap();
        assert_eq!(tag.schema(), "msgs2");

        let tag = EventTag::parse("--=x").unwrap();
        assert!(tag.is_streaming());
        assert_eq!(tag.schema(), "x");
    }

    #[test]
    fn rejects_bad_mode_selector()
    {
        assert_eq!(EventTag::parse("db+users"),
                   Err(RequestError::Mode {
                       event: "db+users".to_string(), mode: '+' }));
    }

    #[test]
    fn rejects_short_names()
    {
        for name in ["", "d", "db"] {
            assert_eq!(EventTag::parse(name),
                       Err(RequestError::EventShape(name.to_string())));
        }
    }

    #[test]
    fn rejects_bad_schema()
    {
        for name in ["db-", "db=", "db-../etc", "db-a/b", "db-a.b",
                     "db-a b", "db=a\\b", "db-café", "db-\u{93e}",
                     "db=ユーザー"] {
            assert!(matches!(EventTag::parse(name),
                             Err(RequestError::Schema(_))), "{name}");
        }
    }
}
