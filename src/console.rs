//! Line console standing in for the touch panel.
//!
//! Accepted lines:
//!
//! ```text
//! startup
//! shutdown
//! power <display> on|off
//! status
//! help
//! quit
//! ```

use std::str::FromStr;
use thiserror::Error;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Startup,
    Shutdown,
    Power { display: String, on: bool },
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("empty line")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: power <display> on|off")]
    PowerUsage,
}

pub const HELP: &str = "\
commands:
  startup                  power on every display
  shutdown                 power off every display
  power <display> on|off   switch one display
  status                   last known state of every display
  quit                     stop the controller";

/// Parse an `on`/`off` style argument.
pub fn parse_switch(word: &str) -> Option<bool> {
    match word.to_ascii_lowercase().as_str() {
        "on" | "1" => Some(true),
        "off" | "0" => Some(false),
        _ => None,
    }
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ConsoleError::Empty);
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "startup" | "start" => ConsoleCommand::Startup,
            "shutdown" => ConsoleCommand::Shutdown,
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            "power" => {
                let (Some(display), Some(switch), None) = (words.next(), words.next(), words.next())
                else {
                    return Err(ConsoleError::PowerUsage);
                };
                let on = parse_switch(switch).ok_or(ConsoleError::PowerUsage)?;
                return Ok(ConsoleCommand::Power {
                    display: display.to_string(),
                    on,
                });
            }
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };

        match words.next() {
            None => Ok(command),
            Some(_) => Err(ConsoleError::Unknown(line.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_room_sequences() {
        assert_eq!("startup".parse(), Ok(ConsoleCommand::Startup));
        assert_eq!("  SHUTDOWN ".parse(), Ok(ConsoleCommand::Shutdown));
        assert_eq!("status".parse(), Ok(ConsoleCommand::Status));
        assert_eq!("quit".parse(), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn parses_display_power() {
        assert_eq!(
            "power left on".parse(),
            Ok(ConsoleCommand::Power {
                display: "left".to_string(),
                on: true
            })
        );
        assert_eq!(
            "power right OFF".parse(),
            Ok(ConsoleCommand::Power {
                display: "right".to_string(),
                on: false
            })
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!("".parse::<ConsoleCommand>(), Err(ConsoleError::Empty));
        assert_eq!(
            "power left".parse::<ConsoleCommand>(),
            Err(ConsoleError::PowerUsage)
        );
        assert_eq!(
            "power left dim".parse::<ConsoleCommand>(),
            Err(ConsoleError::PowerUsage)
        );
        assert_eq!(
            "power left on now".parse::<ConsoleCommand>(),
            Err(ConsoleError::PowerUsage)
        );
        assert!(matches!(
            "route 1 2".parse::<ConsoleCommand>(),
            Err(ConsoleError::Unknown(_))
        ));
        assert!(matches!(
            "status now".parse::<ConsoleCommand>(),
            Err(ConsoleError::Unknown(_))
        ));
    }
}
