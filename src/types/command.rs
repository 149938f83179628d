use std::fmt;

/// A natural-language instruction typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    /// Trims the input; blank input is not a command
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Command(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_rejected() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("  \n\t"), None);
    }

    #[test]
    fn input_is_trimmed() {
        let command = Command::parse("  go to example.com \n").unwrap();
        assert_eq!(command.as_str(), "go to example.com");
    }
}
