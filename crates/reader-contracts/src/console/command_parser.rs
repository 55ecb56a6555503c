use std::path::PathBuf;
use std::str::FromStr;

use super::command_registry::{
    CommandAction, CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};
use crate::language::Language;

/// One line typed into the interactive console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Noop,
    Help,
    Quit,
    Reset,
    Status,
    SetLanguage(Language),
    Scan(PathBuf),
    Save(PathBuf),
    /// Anything that is not a slash command is a passage to read.
    Submit(String),
    Invalid(String),
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<CommandAction> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_arg(arg: &str) -> Option<PathBuf> {
    let trimmed = arg.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|value| value.strip_suffix('\''))
        })
        .unwrap_or(trimmed);
    if unquoted.is_empty() {
        return None;
    }
    Some(PathBuf::from(unquoted))
}

pub fn parse_console_line(text: &str) -> ConsoleCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ConsoleCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return ConsoleCommand::Submit(raw_trimmed.to_string());
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        // "/ path/like text" or a lone slash is prose, not a command.
        return ConsoleCommand::Submit(raw_trimmed.to_string());
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return match action {
            CommandAction::Help => ConsoleCommand::Help,
            CommandAction::Quit => ConsoleCommand::Quit,
            CommandAction::Reset => ConsoleCommand::Reset,
            CommandAction::Status => ConsoleCommand::Status,
            other => ConsoleCommand::Invalid(format!(
                "/{command} is not a bare command ({other:?})"
            )),
        };
    }

    if find_action(&command, RAW_ARG_COMMANDS).is_some() {
        if arg.is_empty() {
            return ConsoleCommand::Invalid("/lang requires a language".to_string());
        }
        return match Language::from_str(arg) {
            Ok(language) => ConsoleCommand::SetLanguage(language),
            Err(err) => ConsoleCommand::Invalid(err),
        };
    }

    if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
        let Some(path) = parse_path_arg(arg) else {
            return ConsoleCommand::Invalid(format!("/{command} requires a path"));
        };
        return match action {
            CommandAction::Scan => ConsoleCommand::Scan(path),
            CommandAction::Save => ConsoleCommand::Save(path),
            other => ConsoleCommand::Invalid(format!("/{command} takes no path ({other:?})")),
        };
    }

    ConsoleCommand::Invalid(format!("Unknown command /{command}. Type /help for commands."))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{parse_console_line, ConsoleCommand};
    use crate::language::Language;

    #[test]
    fn blank_lines_are_noops() {
        assert_eq!(parse_console_line("   \t"), ConsoleCommand::Noop);
    }

    #[test]
    fn prose_is_submitted_trimmed() {
        assert_eq!(
            parse_console_line("  It was a dark and stormy night.\n"),
            ConsoleCommand::Submit("It was a dark and stormy night.".to_string())
        );
        assert_eq!(
            parse_console_line("/ and/or"),
            ConsoleCommand::Submit("/ and/or".to_string())
        );
    }

    #[test]
    fn lang_accepts_any_alias() {
        assert_eq!(
            parse_console_line("/lang deutsch"),
            ConsoleCommand::SetLanguage(Language::German)
        );
        assert_eq!(
            parse_console_line("/LANG ita"),
            ConsoleCommand::SetLanguage(Language::Italian)
        );
        assert!(matches!(
            parse_console_line("/lang"),
            ConsoleCommand::Invalid(_)
        ));
        assert!(matches!(
            parse_console_line("/lang latin"),
            ConsoleCommand::Invalid(message) if message.contains("latin")
        ));
    }

    #[test]
    fn path_commands_strip_quotes() {
        assert_eq!(
            parse_console_line("/scan \"/tmp/my page.jpg\""),
            ConsoleCommand::Scan(PathBuf::from("/tmp/my page.jpg"))
        );
        assert_eq!(
            parse_console_line("/save out.png"),
            ConsoleCommand::Save(PathBuf::from("out.png"))
        );
        assert!(matches!(
            parse_console_line("/scan"),
            ConsoleCommand::Invalid(_)
        ));
    }

    #[test]
    fn reset_aliases_and_unknown_commands() {
        assert_eq!(parse_console_line("/new"), ConsoleCommand::Reset);
        assert_eq!(parse_console_line("/exit"), ConsoleCommand::Quit);
        assert_eq!(parse_console_line("/status"), ConsoleCommand::Status);
        assert!(matches!(
            parse_console_line("/paint"),
            ConsoleCommand::Invalid(message) if message.contains("/paint")
        ));
    }
}
