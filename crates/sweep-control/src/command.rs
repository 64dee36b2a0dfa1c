pub const USAGE: &str = "Usage: wipe <server id>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Wipe(String),
    Quit,
    /// Lists announcements still waiting for their server.
    Status,
    Help,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> Command {
    let args: Vec<&str> = line.split_whitespace().collect();
    match args.as_slice() {
        [] => Command::Empty,
        ["quit"] | ["exit"] => Command::Quit,
        ["status"] => Command::Status,
        ["help"] => Command::Help,
        ["wipe", id] => Command::Wipe(id.to_string()),
        ["wipe"] => Command::Invalid("missing server id".to_string()),
        ["wipe", ..] => Command::Invalid("wipe takes exactly one server id".to_string()),
        [other, ..] => Command::Invalid(format!("unknown command `{other}`")),
    }
}

pub fn help_lines() -> [&'static str; 4] {
    [
        "wipe <server id> - wipes the server",
        "status - lists pending wipe announcements",
        "help - shows this list",
        "quit - exits immediately",
    ]
}
