/// Interactive commands read from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Toggle,
    Reset,
    Snapshot,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "t" | "toggle" | "start" | "stop" => Some(Command::Toggle),
            "r" | "reset" => Some(Command::Reset),
            "s" | "snapshot" => Some(Command::Snapshot),
            "q" | "quit" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("t"), Some(Command::Toggle));
        assert_eq!(Command::parse("  Stop \n"), Some(Command::Toggle));
        assert_eq!(Command::parse("R"), Some(Command::Reset));
        assert_eq!(Command::parse("snapshot"), Some(Command::Snapshot));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("launch"), None);
    }
}
