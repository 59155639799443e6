//! Operator console
//!
//! Line-oriented stand-in for the dashboard buttons, read from stdin:
//!
//! ```text
//! start              press the start/stop button
//! lock | unlock      all doors
//! airbag             toggle the airbag
//! cruise <km/h>      cruise-control set-point
//! cruise on|off
//! key in|out         immobilizer key
//! abs on|off         ABS wheel sensor
//! ```

use std::fmt;
use std::io::{self, BufRead};
use std::thread;

use doggie_ecus::abs::AbsCommand;
use doggie_ecus::cruise_control::CruiseCommand;
use doggie_ecus::immo::ImmoCommand;
use doggie_ecus::{CarHandles, ClusterIntent, EcuError};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Cluster(ClusterIntent),
    Cruise(CruiseCommand),
    Immo(ImmoCommand),
    Abs(AbsCommand),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (try 'help')", self.0)
    }
}

fn on_off(word: Option<&str>, what: &str) -> Result<bool, ParseError> {
    match word {
        Some("on") | Some("in") => Ok(true),
        Some("off") | Some("out") => Ok(false),
        _ => Err(ParseError(format!("'{what}' needs on/off"))),
    }
}

/// Parse one console line; `Ok(None)` for blank lines
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let command = match verb {
        "start" | "stop" => ConsoleCommand::Cluster(ClusterIntent::PressStart),
        "lock" => ConsoleCommand::Cluster(ClusterIntent::LockDoors),
        "unlock" => ConsoleCommand::Cluster(ClusterIntent::UnlockDoors),
        "airbag" => ConsoleCommand::Cluster(ClusterIntent::ToggleAirbag),
        "cruise" => match arg.map(str::parse::<u16>) {
            Some(Ok(speed)) => ConsoleCommand::Cruise(CruiseCommand::SetTarget(speed)),
            _ => ConsoleCommand::Cruise(CruiseCommand::SetEnabled(on_off(arg, "cruise")?)),
        },
        "key" => ConsoleCommand::Immo(ImmoCommand::SetKeyInserted(on_off(arg, "key")?)),
        "abs" => ConsoleCommand::Abs(AbsCommand::SetSensorConnected(on_off(arg, "abs")?)),
        "help" | "?" => ConsoleCommand::Help,
        other => return Err(ParseError(format!("unknown command '{other}'"))),
    };
    Ok(Some(command))
}

/// Forward a command to the ECU that handles it
pub fn dispatch(command: ConsoleCommand, handles: &CarHandles) -> Result<(), EcuError> {
    match command {
        ConsoleCommand::Cluster(intent) => handles.cluster.send(intent),
        ConsoleCommand::Cruise(command) => handles.cruise.send(command),
        ConsoleCommand::Immo(command) => handles.immo.send(command),
        ConsoleCommand::Abs(command) => handles.abs.send(command),
        ConsoleCommand::Help => Ok(()),
    }
}

/// Read lines on a detached thread and forward them over a channel
///
/// A blocking read cannot be cancelled, so it must not live on the runtime's
/// blocking pool or shutdown would wait for the next line. The thread exits
/// at end of input or once the receiver is gone.
pub fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Console read failed");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

pub const HELP: &str = "commands: start | lock | unlock | airbag | cruise <km/h> | \
cruise on|off | key in|out | abs on|off";

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("start", ConsoleCommand::Cluster(ClusterIntent::PressStart))]
    #[case("  unlock ", ConsoleCommand::Cluster(ClusterIntent::UnlockDoors))]
    #[case("lock", ConsoleCommand::Cluster(ClusterIntent::LockDoors))]
    #[case("airbag", ConsoleCommand::Cluster(ClusterIntent::ToggleAirbag))]
    #[case("cruise 80", ConsoleCommand::Cruise(CruiseCommand::SetTarget(80)))]
    #[case("cruise off", ConsoleCommand::Cruise(CruiseCommand::SetEnabled(false)))]
    #[case("key out", ConsoleCommand::Immo(ImmoCommand::SetKeyInserted(false)))]
    #[case("abs off", ConsoleCommand::Abs(AbsCommand::SetSensorConnected(false)))]
    #[case("abs on", ConsoleCommand::Abs(AbsCommand::SetSensorConnected(true)))]
    fn test_parse(#[case] line: &str, #[case] expected: ConsoleCommand) {
        assert_eq!(parse(line), Ok(Some(expected)));
    }

    #[rstest]
    #[case("fly")]
    #[case("key")]
    #[case("cruise fast")]
    fn test_parse_errors(#[case] line: &str) {
        assert!(parse(line).is_err());
    }

    /// Blocks until released, then reports end of input
    struct Stalled(std::sync::mpsc::Receiver<()>);

    impl io::Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn test_line_reader_forwards_until_eof() {
        let mut lines = spawn_line_reader(io::Cursor::new("start\n\nkey out\n")).unwrap();
        assert_eq!(lines.blocking_recv().as_deref(), Some("start"));
        assert_eq!(lines.blocking_recv().as_deref(), Some(""));
        assert_eq!(lines.blocking_recv().as_deref(), Some("key out"));
        assert_eq!(lines.blocking_recv(), None);
    }

    #[test]
    fn test_pending_read_does_not_hold_runtime_shutdown() {
        let (release, stalled) = std::sync::mpsc::channel::<()>();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut lines = spawn_line_reader(io::BufReader::new(Stalled(stalled))).unwrap();
        let console = runtime.spawn(async move { lines.recv().await });

        let begun = std::time::Instant::now();
        drop(runtime);
        assert!(begun.elapsed() < std::time::Duration::from_secs(1));

        drop(console);
        drop(release);
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("   "), Ok(None));
    }
}
