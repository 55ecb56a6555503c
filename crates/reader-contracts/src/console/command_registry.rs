#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandAction {
    Help,
    Quit,
    Reset,
    Status,
    SetLanguage,
    Scan,
    Save,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: CommandAction,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: CommandAction::Help,
    },
    CommandSpec {
        command: "quit",
        action: CommandAction::Quit,
    },
    CommandSpec {
        command: "exit",
        action: CommandAction::Quit,
    },
    CommandSpec {
        command: "reset",
        action: CommandAction::Reset,
    },
    CommandSpec {
        command: "new",
        action: CommandAction::Reset,
    },
    CommandSpec {
        command: "status",
        action: CommandAction::Status,
    },
];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "lang",
    action: CommandAction::SetLanguage,
}];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "scan",
        action: CommandAction::Scan,
    },
    CommandSpec {
        command: "save",
        action: CommandAction::Save,
    },
];

pub const CONSOLE_HELP_COMMANDS: &[&str] = &[
    "/lang <language>",
    "/scan <image path>",
    "/save <png path>",
    "/status",
    "/reset",
    "/help",
    "/quit",
];
