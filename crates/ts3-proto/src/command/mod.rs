//! The TS3 command sublanguage: newline-terminated, `|`-separated items of
//! space-separated `key=value` pairs and bare flags.

mod escape;

pub use escape::{escape, unescape};

use derive_more::{Display, Error};

/// Errors raised while parsing a command.
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
pub enum CommandParseError {
    /// The input had no tokens at all.
    #[display(fmt = "empty command")]
    Empty,

    /// The first token of the first item contained `=`, so there is no
    /// usable command name and [`parse`] (as opposed to [`parse_body`]) was
    /// called, which requires one.
    #[display(fmt = "command has no name and none was expected")]
    MissingName,
}

/// One parameter within a command item: either a `key=value` pair or a
/// bare flag (a key with no value).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Param {
    /// A bare token with no `=`.
    Flag(String),
    /// A `key=value` pair, with `value` already unescaped.
    KeyValue(String, String),
}

/// One `|`-separated record of a command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Item(pub Vec<Param>);

impl Item {
    /// Looks up the unescaped value of `key`, if present as a
    /// [`Param::KeyValue`].
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find_map(|p| match p {
            Param::KeyValue(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// Whether `key` is present as a bare [`Param::Flag`].
    #[must_use]
    pub fn has_flag(&self, key: &str) -> bool {
        self.0
            .iter()
            .any(|p| matches!(p, Param::Flag(k) if k == key))
    }
}

/// A fully parsed command: an optional name and one or more items.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Command {
    /// The command name, e.g. `"notifytextmessage"`. `None` for a
    /// continuation body parsed with [`parse_body`].
    pub name: Option<String>,
    /// The `|`-separated items.
    pub items: Vec<Item>,
}

/// Parses a full named command. Fails with
/// [`CommandParseError::MissingName`] if the first token contains `=`
/// (i.e. the text is a nameless continuation body); use [`parse_body`] for
/// that case instead.
pub fn parse(text: &str) -> Result<Command, CommandParseError> {
    let text = text.trim_end_matches(|c| c == '\n' || c == '\r');
    if text.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut raw_items = text.split('|');
    let first_raw = raw_items.next().unwrap_or_default();
    let mut first_tokens = first_raw.split(' ').filter(|t| !t.is_empty());

    let name = match first_tokens.next() {
        Some(tok) if !tok.contains('=') => tok.to_string(),
        _ => return Err(CommandParseError::MissingName),
    };

    let mut items = Vec::new();
    items.push(Item(first_tokens.map(parse_token).collect()));
    for raw_item in raw_items {
        items.push(Item(
            raw_item
                .split(' ')
                .filter(|t| !t.is_empty())
                .map(parse_token)
                .collect(),
        ));
    }

    Ok(Command {
        name: Some(name),
        items,
    })
}

/// Parses a nameless continuation body: a `|`-separated list of items with
/// no leading command name, as returned in multi-row query responses.
#[must_use]
pub fn parse_body(text: &str) -> Vec<Item> {
    let text = text.trim_end_matches(|c| c == '\n' || c == '\r');
    if text.is_empty() {
        return Vec::new();
    }
    text.split('|')
        .map(|raw_item| {
            Item(
                raw_item
                    .split(' ')
                    .filter(|t| !t.is_empty())
                    .map(parse_token)
                    .collect(),
            )
        })
        .collect()
}

/// Serializes a [`Command`] back to wire form (without a trailing
/// newline).
#[must_use]
pub fn serialize(cmd: &Command) -> String {
    if cmd.items.is_empty() {
        return cmd.name.clone().unwrap_or_default();
    }
    cmd.items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let mut tokens = Vec::with_capacity(item.0.len() + 1);
            if idx == 0 {
                if let Some(name) = &cmd.name {
                    tokens.push(name.clone());
                }
            }
            tokens.extend(item.0.iter().map(serialize_param));
            tokens.join(" ")
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn serialize_param(param: &Param) -> String {
    match param {
        Param::Flag(key) => key.clone(),
        Param::KeyValue(key, value) => format!("{}={}", key, escape(value)),
    }
}

fn parse_token(token: &str) -> Param {
    let mut parts = token.splitn(2, '=');
    let key = parts.next().unwrap_or_default();
    match parts.next() {
        Some(value) => Param::KeyValue(key.to_string(), unescape(value)),
        None => Param::Flag(key.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_named_command() {
        let cmd = parse("clientinit nickname=Bot\\svoicebeacon channel=0").unwrap();
        assert_eq!(cmd.name.as_deref(), Some("clientinit"));
        assert_eq!(cmd.items.len(), 1);
        assert_eq!(cmd.items[0].get("nickname"), Some("Bot voicebeacon"));
        assert_eq!(cmd.items[0].get("channel"), Some("0"));
    }

    #[test]
    fn parses_flag_token() {
        let cmd = parse("servernotifyregister event=server").unwrap();
        assert_eq!(cmd.items[0].get("event"), Some("server"));

        let cmd = parse("foo bar").unwrap();
        assert!(cmd.items[0].has_flag("bar"));
    }

    #[test]
    fn parses_multi_item_list() {
        let cmd =
            parse("notifycliententerview clid=1|clid=2|clid=3").unwrap();
        assert_eq!(cmd.items.len(), 3);
        assert_eq!(cmd.items[0].get("clid"), Some("1"));
        assert_eq!(cmd.items[1].get("clid"), Some("2"));
        assert_eq!(cmd.items[2].get("clid"), Some("3"));
    }

    #[test]
    fn rejects_nameless_input() {
        assert_eq!(parse("clid=1|clid=2"), Err(CommandParseError::MissingName));
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse(""), Err(CommandParseError::Empty));
        assert_eq!(parse("\r\n"), Err(CommandParseError::Empty));
    }

    #[test]
    fn parse_body_handles_nameless_rows() {
        let items = parse_body("cid=1 channel_name=General|cid=2 channel_name=AFK");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("channel_name"), Some("General"));
        assert_eq!(items[1].get("channel_name"), Some("AFK"));
    }

    #[test]
    fn serialize_round_trips_named_single_item() {
        let cmd = Command {
            name: Some("sendtextmessage".to_string()),
            items: vec![Item(vec![
                Param::KeyValue("targetmode".to_string(), "2".to_string()),
                Param::KeyValue(
                    "msg".to_string(),
                    "hello | world\\nwith specials".to_string(),
                ),
            ])],
        };
        let wire = serialize(&cmd);
        let reparsed = parse(&wire).unwrap();
        assert_eq!(reparsed, cmd);
    }

    #[test]
    fn serialize_round_trips_multi_item_preserving_order() {
        let cmd = Command {
            name: Some("list".to_string()),
            items: vec![
                Item(vec![Param::KeyValue("a".to_string(), "1".to_string())]),
                Item(vec![Param::KeyValue("a".to_string(), "2".to_string())]),
                Item(vec![Param::KeyValue("a".to_string(), "3".to_string())]),
            ],
        };
        let wire = serialize(&cmd);
        let reparsed = parse(&wire).unwrap();
        assert_eq!(reparsed, cmd);
    }

    #[test]
    fn serialize_round_trips_flag_and_empty_value() {
        let cmd = Command {
            name: Some("cmd".to_string()),
            items: vec![Item(vec![
                Param::Flag("flagtoken".to_string()),
                Param::KeyValue("empty".to_string(), String::new()),
            ])],
        };
        let wire = serialize(&cmd);
        let reparsed = parse(&wire).unwrap();
        assert_eq!(reparsed, cmd);
    }
}
