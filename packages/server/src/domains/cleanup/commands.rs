//! Parsing of slash-command text.

use std::time::Duration;

use thiserror::Error;

use super::jobs::CleanChannelOptions;

/// Longest delay `/tmpt` accepts.
pub const MAX_TIMEOUT_MINUTES: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("expected a message followed by a number of minutes")]
    MissingMinutes,
    #[error("`{0}` is not a number of minutes")]
    InvalidMinutes(String),
    #[error("{0} minutes is longer than the 15 minute limit")]
    TooLong(u64),
    #[error("message text is empty")]
    EmptyMessage,
    #[error("expected 3 options (messages files bots), got {0}")]
    WrongOptionCount(usize),
    #[error("`{0}` is not a boolean")]
    InvalidBool(String),
}

/// Split `/tmpt` text into the message and its lifetime.
///
/// The last word is the number of minutes (0 to 15); everything before it is
/// the message.
pub fn parse_timeout_text(raw: &str) -> Result<(String, Duration), CommandError> {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    let last = words.pop().ok_or(CommandError::MissingMinutes)?;

    let minutes: u64 = last
        .parse()
        .map_err(|_| CommandError::InvalidMinutes(last.to_string()))?;
    if minutes > MAX_TIMEOUT_MINUTES {
        return Err(CommandError::TooLong(minutes));
    }
    if words.is_empty() {
        return Err(CommandError::EmptyMessage);
    }

    Ok((words.join(" "), Duration::from_secs(minutes * 60)))
}

/// Parse `/clean` text: empty means everything, otherwise exactly three
/// booleans for messages, files and bot messages.
pub fn parse_clean_options(raw: &str) -> Result<CleanChannelOptions, CommandError> {
    let words: Vec<&str> = raw.split_whitespace().collect();
    match words.as_slice() {
        [] => Ok(CleanChannelOptions::all()),
        [messages, files, bots] => Ok(CleanChannelOptions {
            delete_messages: parse_bool(messages)?,
            delete_files: parse_bool(files)?,
            delete_bot_messages: parse_bool(bots)?,
        }),
        other => Err(CommandError::WrongOptionCount(other.len())),
    }
}

/// Accepts the same spellings Slack users type for flags: 1/0, t/f, true/false.
fn parse_bool(word: &str) -> Result<bool, CommandError> {
    match word {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(CommandError::InvalidBool(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_text_splits_message_and_minutes() {
        let (text, delay) = parse_timeout_text("lunch is here 10").unwrap();
        assert_eq!(text, "lunch is here");
        assert_eq!(delay, Duration::from_secs(600));
    }

    #[test]
    fn timeout_boundaries() {
        assert_eq!(parse_timeout_text("now 0").unwrap().1, Duration::ZERO);
        assert_eq!(parse_timeout_text("later 15").unwrap().1, Duration::from_secs(900));
        assert_eq!(parse_timeout_text("too late 16"), Err(CommandError::TooLong(16)));
    }

    #[test]
    fn timeout_rejects_bad_input() {
        assert_eq!(parse_timeout_text(""), Err(CommandError::MissingMinutes));
        assert_eq!(
            parse_timeout_text("hello world"),
            Err(CommandError::InvalidMinutes("world".to_string()))
        );
        assert_eq!(
            parse_timeout_text("negative -1"),
            Err(CommandError::InvalidMinutes("-1".to_string()))
        );
        assert_eq!(parse_timeout_text("5"), Err(CommandError::EmptyMessage));
    }

    #[test]
    fn empty_clean_text_means_everything() {
        assert_eq!(parse_clean_options("").unwrap(), CleanChannelOptions::all());
        assert_eq!(parse_clean_options("   ").unwrap(), CleanChannelOptions::all());
    }

    #[test]
    fn clean_options_are_positional() {
        let options = parse_clean_options("true 0 F").unwrap();
        assert!(options.delete_messages);
        assert!(!options.delete_files);
        assert!(!options.delete_bot_messages);
    }

    #[test]
    fn clean_options_need_exactly_three_booleans() {
        assert_eq!(
            parse_clean_options("true false"),
            Err(CommandError::WrongOptionCount(2))
        );
        assert_eq!(
            parse_clean_options("yes no maybe"),
            Err(CommandError::InvalidBool("yes".to_string()))
        );
    }
}
