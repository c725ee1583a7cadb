#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCommand {
    Noop,
    Help,
    Quit,
    Search(String),
    Photo(String),
    Select(String),
    More,
    Reset,
    Show,
    Gallery,
    Unknown { command: String, raw: String },
    Invalid { command: String, reason: String },
}

#[derive(Clone, Copy, Debug)]
struct CommandSpec {
    command: &'static str,
    usage: &'static str,
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "search",
        usage: "/search <name or description>",
    },
    CommandSpec {
        command: "photo",
        usage: "/photo <path>",
    },
    CommandSpec {
        command: "select",
        usage: "/select <number|id>",
    },
    CommandSpec {
        command: "more",
        usage: "/more",
    },
    CommandSpec {
        command: "gallery",
        usage: "/gallery",
    },
    CommandSpec {
        command: "show",
        usage: "/show",
    },
    CommandSpec {
        command: "reset",
        usage: "/reset",
    },
    CommandSpec {
        command: "help",
        usage: "/help",
    },
    CommandSpec {
        command: "quit",
        usage: "/quit",
    },
];

pub fn help_lines() -> Vec<&'static str> {
    COMMANDS.iter().map(|spec| spec.usage).collect()
}

fn parse_single_path_arg(arg: &str) -> Option<String> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return None;
    }
    match shell_words::split(trimmed) {
        Ok(parts) if parts.len() == 1 => parts.into_iter().next(),
        // Unquoted paths with spaces are taken verbatim.
        Ok(_) | Err(_) => Some(trimmed.to_string()),
    }
}

pub fn parse_command(input: &str) -> SurfaceCommand {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return SurfaceCommand::Noop;
    }
    let Some(body) = trimmed.strip_prefix('/') else {
        return SurfaceCommand::Search(trimmed.to_string());
    };

    let (command, arg) = match body.split_once(char::is_whitespace) {
        Some((command, arg)) => (command.to_ascii_lowercase(), arg.trim()),
        None => (body.to_ascii_lowercase(), ""),
    };

    let invalid = |reason: &str| SurfaceCommand::Invalid {
        command: command.clone(),
        reason: reason.to_string(),
    };

    match command.as_str() {
        "search" | "s" => {
            if arg.is_empty() {
                invalid("/search requires text")
            } else {
                SurfaceCommand::Search(arg.to_string())
            }
        }
        "photo" | "p" => match parse_single_path_arg(arg) {
            Some(path) => SurfaceCommand::Photo(path),
            None => invalid("/photo requires a path"),
        },
        "select" => {
            if arg.is_empty() {
                invalid("/select requires a gallery number or id")
            } else {
                SurfaceCommand::Select(arg.to_string())
            }
        }
        "more" => SurfaceCommand::More,
        "gallery" => SurfaceCommand::Gallery,
        "show" => SurfaceCommand::Show,
        "reset" => SurfaceCommand::Reset,
        "help" | "?" => SurfaceCommand::Help,
        "quit" | "exit" | "q" => SurfaceCommand::Quit,
        _ => SurfaceCommand::Unknown {
            command: command.clone(),
            raw: trimmed.to_string(),
        },
    }
}
