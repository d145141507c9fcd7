use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use opilink_engine::{EngineConfig, OpiEngine, Request};
use opilink_transport::{ChannelConfig, TerminalEndpoint};
use rust_decimal::Decimal;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod session;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in to the terminal.
    Login,
    /// Log off from the terminal.
    Logoff,
    /// Run a card payment.
    Pay(AmountArgs),
    /// Refund part of an earlier payment.
    Refund(AmountArgs),
    /// Reverse an earlier payment by its STAN.
    Reverse(ReverseArgs),
    /// Run the terminal's end-of-day reconciliation.
    Reconcile,
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let (request, login_first) = match command {
        Command::Version(args) => return version::run(args),
        Command::Login => (Request::Login, false),
        Command::Logoff => (Request::Logoff, false),
        Command::Pay(args) => (
            Request::Payment {
                amount: args.amount,
                currency: args.currency,
            },
            true,
        ),
        Command::Refund(args) => (
            Request::Refund {
                amount: args.amount,
                currency: args.currency,
            },
            true,
        ),
        Command::Reverse(args) => (
            Request::Reversal {
                reference_id: args.reference,
            },
            true,
        ),
        Command::Reconcile => (Request::Reconciliation, true),
    };
    session::run(
        connection,
        format,
        request,
        login_first && !connection.no_login,
    )
}

/// Which side opens the connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Topology {
    /// Dial the terminal over WebSocket.
    Client,
    /// Listen for the terminal to dial in.
    Server,
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Who opens the connection.
    #[arg(long, value_enum, default_value = "client", env = "OPILINK_TOPOLOGY", global = true)]
    pub topology: Topology,

    /// Terminal host (client) or bind address (server).
    #[arg(long, default_value = "127.0.0.1", env = "OPILINK_HOST", global = true)]
    pub host: String,

    /// Terminal port (client) or listening port (server).
    #[arg(long, default_value = "20002", env = "OPILINK_PORT", global = true)]
    pub port: u16,

    /// Additional listening port for device traffic (server only).
    #[arg(long, env = "OPILINK_SECONDARY_PORT", global = true)]
    pub secondary_port: Option<u16>,

    /// WorkstationID sent with every request.
    #[arg(long, default_value = "POS1", env = "OPILINK_WORKSTATION_ID", global = true)]
    pub workstation_id: String,

    /// ApplicationSender sent with every request.
    #[arg(long, default_value = "POS", global = true)]
    pub application_sender: String,

    /// How long the terminal may take to answer an operation (e.g. 90s, 3m).
    #[arg(long, default_value = "180s", value_parser = parse_duration, env = "OPILINK_TIMEOUT", global = true)]
    pub timeout: Duration,

    /// How long to wait for the terminal connection.
    #[arg(long, default_value = "30s", value_parser = parse_duration, global = true)]
    pub connect_timeout: Duration,

    /// Skip the login that precedes payment operations.
    #[arg(long, global = true)]
    pub no_login: bool,
}

impl ConnectionArgs {
    pub fn endpoint(&self) -> TerminalEndpoint {
        let endpoint = TerminalEndpoint::new(self.host.clone(), self.port);
        match self.secondary_port {
            Some(port) => endpoint.with_secondary_port(port),
            None => endpoint,
        }
    }

    pub fn engine(&self) -> OpiEngine {
        let channel_config = ChannelConfig {
            connect_timeout: self.connect_timeout,
            ..ChannelConfig::default()
        };
        let config = EngineConfig {
            application_sender: self.application_sender.clone(),
            workstation_id: self.workstation_id.clone(),
            operation_timeout: self.timeout,
            ..EngineConfig::default()
        };
        match self.topology {
            Topology::Client => OpiEngine::client(self.endpoint(), channel_config, config),
            Topology::Server => OpiEngine::server(self.endpoint(), channel_config, config),
        }
    }
}

#[derive(Args, Debug)]
pub struct AmountArgs {
    /// Amount in minor units of the currency (1250 = 12.50 EUR).
    #[arg(long)]
    pub amount: Decimal,
    /// ISO-4217 currency code.
    #[arg(long, default_value = "EUR")]
    pub currency: String,
}

#[derive(Args, Debug)]
pub struct ReverseArgs {
    /// STAN of the transaction to reverse.
    #[arg(long)]
    pub reference: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `5s`, `3m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = input.strip_suffix('m') {
        (num, "m")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        _ => Ok(Duration::from_secs(value)),
    }
}
