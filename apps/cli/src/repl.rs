//! Interactive `cql>` shell.

use colored::Colorize;
use cqlscope_core::{DescribeCommand, QuerySession, SessionError};
use std::io::Write;
use tracing::debug;

use crate::colors::ShellColors;
use crate::pager::{Pager, Reply};

pub const PROMPT: &str = "cql> ";

/// What the shell should do with one input line.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Quit,
    Skip,
    Run { query: String, hide_system: bool },
    Invalid(String),
}

fn parse_line(line: &str) -> Action {
    let line = line.trim();
    if line.is_empty() {
        return Action::Skip;
    }
    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        return Action::Quit;
    }
    match DescribeCommand::parse(line) {
        Ok(Some(command)) => Action::Run {
            query: command.to_query(),
            hide_system: command.hides_system(),
        },
        Ok(None) => Action::Run { query: line.to_string(), hide_system: false },
        Err(e) => Action::Invalid(e.to_string()),
    }
}

/// Reads statements until `quit`, `exit`, end of input, or Ctrl-C at the
/// prompt.
///
/// Errors from a statement are printed and the loop continues. Ctrl-C during
/// a listing only stops that listing.
pub async fn run<W: Write>(
    pager: &mut Pager<W>,
    session: &mut QuerySession,
    page_size: usize,
) -> anyhow::Result<()> {
    let colors = ShellColors::new();
    loop {
        write!(pager.output(), "{}", PROMPT.color(colors.primary()))?;
        pager.output().flush()?;

        let Reply::Line(line) = pager.read_line().await? else {
            writeln!(pager.output())?;
            break;
        };

        match parse_line(&line) {
            Action::Quit => break,
            Action::Skip => {}
            Action::Invalid(message) => {
                let message = format!("Error: {message}");
                writeln!(pager.output(), "{}", message.color(colors.error()))?;
            }
            Action::Run { query, hide_system } => {
                debug!(query = %query, hide_system, "Shell statement");
                if let Err(e) = pager.list(session, &query, page_size, hide_system).await {
                    report(pager.output(), &colors, &e)?;
                }
            }
        }
    }
    Ok(())
}

fn report<W: Write>(
    output: &mut W,
    colors: &ShellColors,
    error: &anyhow::Error,
) -> std::io::Result<()> {
    writeln!(output, "{}", format!("Error: {error}").color(colors.error()))?;
    if let Some(SessionError::ConnectionUnavailable(_)) = error.downcast_ref::<SessionError>() {
        writeln!(output, "The connection will be retried on the next statement.")?;
    }
    Ok(())
}
