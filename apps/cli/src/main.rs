//! cqlscope - paged CQL shell.
//!
//! Runs a single statement (`--cql`, `--keyspaces`, `--tables`) or an
//! interactive `cql>` shell against a cluster, optionally through an SSH hop.

mod colors;
mod config;
mod pager;
mod repl;

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;
use cqlscope_core::config::{ClientConfig, parse_hosts};
use cqlscope_core::schema::{KEYSPACES_QUERY, TABLES_QUERY};
use cqlscope_core::{HopOptions, QuerySession, RemoteHop, logging};
use cqlscope_drivers::{DriverType, connector_for};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{Level, info};

use colors::ShellColors;
use config::Overrides;
use pager::{Interrupt, LineReader, Pager};

/// Paged CQL shell
///
/// Fetches query results one page at a time and prompts between pages.
/// Without a statement argument an interactive shell is started.
#[derive(Parser, Debug)]
#[command(
    name = "cqlscope",
    author,
    version,
    about = "Paged CQL shell with optional SSH hop"
)]
struct Args {
    /// Database listen address(es), comma separated; also the SSH host with --remote
    #[arg(long)]
    ip: String,

    /// Database port [default: 9042]
    #[arg(long)]
    port: Option<u16>,

    /// Database user
    #[arg(long)]
    user: Option<String>,

    /// Database password
    #[arg(long)]
    passwd: Option<String>,

    /// Statement to run
    #[arg(long)]
    cql: Option<String>,

    /// List keyspaces
    #[arg(long)]
    keyspaces: bool,

    /// List keyspaces and tables
    #[arg(long)]
    tables: bool,

    /// Reach the database through an SSH hop
    #[arg(short = 'r', long)]
    remote: bool,

    /// SSH hop host (defaults to the first --ip address)
    #[arg(long, requires = "remote")]
    remote_host: Option<String>,

    /// SSH user [default: root]
    #[arg(short = 'u', long)]
    remote_user: Option<String>,

    /// SSH password (prompted when omitted)
    #[arg(short = 'p', long)]
    remote_password: Option<String>,

    /// Print every page without prompting
    #[arg(short = 'c', long)]
    continues: bool,

    /// Rows per page [default: 50]
    #[arg(long)]
    page_size: Option<usize>,

    /// Driver (scylla, fixture)
    #[arg(long)]
    driver: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    /// The one-shot statement, if any. `--tables` wins over `--keyspaces`,
    /// which wins over `--cql`.
    fn statement(&self) -> Option<String> {
        if self.tables {
            Some(TABLES_QUERY.to_string())
        } else if self.keyspaces {
            Some(KEYSPACES_QUERY.to_string())
        } else {
            self.cql.clone()
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            user: self.user.clone(),
            password: self.passwd.clone(),
            page_size: self.page_size,
            driver: self.driver.clone(),
            remote_user: self.remote_user.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::load_config(args.config.as_deref())?;
    config::apply_overrides(&mut config, args.overrides());

    let level = if args.debug {
        Level::DEBUG
    } else {
        logging::parse_level(config.log_level.as_deref().unwrap_or("warn"))
    };
    logging::init(level)?;

    let hosts = parse_hosts(&args.ip);
    if hosts.is_empty() {
        bail!("--ip needs at least one address");
    }
    let driver: DriverType = config.driver().parse().map_err(anyhow::Error::msg)?;
    info!(driver = %driver, hosts = ?hosts, "Starting cqlscope");

    let endpoint = config.endpoint(hosts.clone());
    let mut session = QuerySession::new(endpoint, connector_for(driver));
    let result = run(&args, &config, &hosts, &mut session).await;
    session.close().await;
    result
}

async fn run(
    args: &Args,
    config: &ClientConfig,
    hosts: &[String],
    session: &mut QuerySession,
) -> anyhow::Result<()> {
    if args.remote {
        let hop_host = hop_target(args, hosts);
        let password = match &args.remote_password {
            Some(password) => password.clone(),
            None => rpassword::prompt_password("Password: ")
                .context("Failed to read SSH password")?,
        };
        let hop = RemoteHop::new(hop_host, password)
            .with_user(config.ssh_user())
            .with_port(config.ssh_port());
        let options = HopOptions {
            keepalive: config.keepalive(),
            detect_address: config.detect_address(),
        };
        session.open_remote(&hop, options).await?;
    }
    if session.is_tunneled() {
        let endpoint = session.endpoint();
        info!(hop = %hop_target(args, hosts), local = ?endpoint.addresses(), "Tunnel ready");
    }

    // The password prompt above must finish before this thread takes stdin.
    let input = LineReader::spawn(io::BufReader::new(io::stdin()));
    let mut pager = Pager::new(input, io::stdout(), args.continues, Interrupt::install());
    let page_size = config.page_size();

    match args.statement() {
        Some(statement) => {
            let listing = pager.list(session, &statement, page_size, false).await?;
            let colors = ShellColors::new();
            let out = pager.output();
            writeln!(out)?;
            writeln!(
                out,
                "{}",
                format!("Total Time: {:.6}", listing.elapsed.as_secs_f64()).color(colors.success())
            )?;
            Ok(())
        }
        None => repl::run(&mut pager, session, page_size).await,
    }
}

fn hop_target(args: &Args, hosts: &[String]) -> String {
    args.remote_host.clone().unwrap_or_else(|| hosts[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_precedence() {
        let cql = ["cqlscope", "--ip", "10.0.0.1", "--cql", "SELECT * FROM a.b"];
        let args = Args::parse_from(cql.iter().copied().chain(["--tables"]));
        assert_eq!(args.statement().as_deref(), Some(TABLES_QUERY));

        let args = Args::parse_from(cql.iter().copied().chain(["--keyspaces"]));
        assert_eq!(args.statement().as_deref(), Some(KEYSPACES_QUERY));

        let args = Args::parse_from(["cqlscope", "--ip", "10.0.0.1"]);
        assert_eq!(args.statement(), None);
    }

    #[test]
    fn test_short_flags() {
        let args =
            Args::parse_from(["cqlscope", "--ip", "10.0.0.1", "-r", "-u", "ops", "-p", "pw", "-c"]);
        assert!(args.remote);
        assert!(args.continues);
        assert_eq!(args.remote_user.as_deref(), Some("ops"));
        assert_eq!(args.remote_password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_hop_target_defaults_to_first_ip() {
        let hosts = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        let args = Args::parse_from(["cqlscope", "--ip", "10.0.0.1,10.0.0.2", "-r"]);
        assert_eq!(hop_target(&args, &hosts), "10.0.0.1");

        let args =
            Args::parse_from(["cqlscope", "--ip", "10.0.0.1", "-r", "--remote-host", "10.0.0.9"]);
        assert_eq!(hop_target(&args, &hosts), "10.0.0.9");
    }

    #[test]
    fn test_remote_host_requires_remote() {
        let result =
            Args::try_parse_from(["cqlscope", "--ip", "10.0.0.1", "--remote-host", "10.0.0.9"]);
        assert!(result.is_err());
    }
}
