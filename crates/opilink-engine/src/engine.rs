//! [`OpiEngine`]: the async handle that drives a [`Correlator`] over a channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use opilink_transport::{
    event_channel, Channel, ChannelConfig, ChannelEvent, ClientChannel, ConnectionState,
    EventStream, ServerChannel, TerminalEndpoint, TransportError,
};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::correlator::{Correlator, Request};
use crate::error::{RequestError, Result};
use crate::status::{ErrorReason, OperationStatus};

/// Engine-level settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `ApplicationSender` attribute of every request.
    pub application_sender: String,
    /// `WorkstationID` attribute of every request.
    pub workstation_id: String,
    /// How long a sent request may stay unanswered.
    pub operation_timeout: Duration,
    /// Statuses buffered per subscriber before it lags.
    pub status_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            application_sender: "POS".to_string(),
            workstation_id: "POS1".to_string(),
            operation_timeout: Duration::from_secs(180),
            status_capacity: 64,
        }
    }
}

enum Command {
    Begin(Request, oneshot::Sender<Result<String>>),
    Abort(oneshot::Sender<Result<()>>),
    Close(oneshot::Sender<()>),
}

/// Cloneable handle to one terminal connection and its operation state.
///
/// Statuses are published on a broadcast stream; subscribe before issuing a
/// request to observe all of them. Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct OpiEngine {
    channel: Arc<dyn Channel>,
    commands: mpsc::Sender<Command>,
    statuses: broadcast::Sender<OperationStatus>,
}

impl OpiEngine {
    /// Engine that dials the terminal (client topology).
    pub fn client(
        endpoint: TerminalEndpoint,
        channel_config: ChannelConfig,
        config: EngineConfig,
    ) -> Self {
        let (sink, events) = event_channel();
        Self::with_channel(ClientChannel::new(endpoint, channel_config, sink), events, config)
    }

    /// Engine that waits for the terminal to dial in (server topology).
    pub fn server(
        endpoint: TerminalEndpoint,
        channel_config: ChannelConfig,
        config: EngineConfig,
    ) -> Self {
        let (sink, events) = event_channel();
        Self::with_channel(ServerChannel::new(endpoint, channel_config, sink), events, config)
    }

    /// Engine over any channel. `events` must be the stream `channel` reports into.
    pub fn with_channel<C>(channel: C, events: EventStream, config: EngineConfig) -> Self
    where
        C: Channel + 'static,
    {
        let channel: Arc<dyn Channel> = Arc::new(channel);
        let (commands, inbox) = mpsc::channel(16);
        let (statuses, _) = broadcast::channel(config.status_capacity.max(1));

        let actor = Actor {
            correlator: Correlator::new(
                config.application_sender.clone(),
                config.workstation_id.clone(),
            ),
            channel: Arc::clone(&channel),
            statuses: statuses.clone(),
            operation_timeout: config.operation_timeout,
            deadline: None,
        };
        tokio::spawn(actor.run(inbox, events));

        Self {
            channel,
            commands,
            statuses,
        }
    }

    /// Every status published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationStatus> {
        self.statuses.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.channel.subscribe_state()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Connect (client) or start listening (server).
    pub async fn open(&self) -> Result<()> {
        self.channel.open().await.map_err(RequestError::from)
    }

    /// Like [`open`](Self::open), then wait until a terminal is connected.
    pub async fn open_and_wait(&self, timeout: Duration) -> Result<()> {
        self.open().await?;
        let mut state = self.connection_state();
        let connected = tokio::time::timeout(
            timeout,
            state.wait_for(|state| *state == ConnectionState::Connected),
        )
        .await
        .map(|waited| waited.map(|_| ()));
        match connected {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RequestError::EngineClosed),
            Err(_) => Err(RequestError::NotInitialised),
        }
    }

    /// Log in to the terminal. Returns the request id.
    pub async fn login(&self) -> Result<String> {
        self.begin(Request::Login).await
    }

    pub async fn logoff(&self) -> Result<String> {
        self.begin(Request::Logoff).await
    }

    /// Start a card payment of `amount` minor units of `currency`.
    pub async fn initiate_card_payment(&self, amount: Decimal, currency: &str) -> Result<String> {
        self.begin(Request::Payment {
            amount,
            currency: currency.to_string(),
        })
        .await
    }

    pub async fn initiate_partial_refund(&self, amount: Decimal, currency: &str) -> Result<String> {
        self.begin(Request::Refund {
            amount,
            currency: currency.to_string(),
        })
        .await
    }

    /// Reverse the transaction whose STAN is `reference_id`.
    pub async fn initiate_payment_reversal(&self, reference_id: &str) -> Result<String> {
        self.begin(Request::Reversal {
            reference_id: reference_id.to_string(),
        })
        .await
    }

    pub async fn initiate_reconciliation(&self) -> Result<String> {
        self.begin(Request::Reconciliation).await
    }

    /// Ask the terminal to abort the pending operation.
    pub async fn abort(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send_command(Command::Abort(reply)).await?;
        response.await.map_err(|_| RequestError::EngineClosed)?
    }

    /// Drop any pending operation, close the channel and publish `Idle`.
    ///
    /// Nothing the terminal sends while the channel shuts down can resolve the
    /// dropped operation. Also unblocks an `open` that is still connecting.
    pub async fn close(&self) {
        let (reply, response) = oneshot::channel();
        match self.send_command(Command::Close(reply)).await {
            Ok(()) => {
                let _ = response.await;
            }
            Err(_) => self.channel.close().await,
        }
    }

    /// Issue `request`; resolves once it is on the wire.
    pub async fn begin(&self, request: Request) -> Result<String> {
        let (reply, response) = oneshot::channel();
        self.send_command(Command::Begin(request, reply)).await?;
        response.await.map_err(|_| RequestError::EngineClosed)?
    }

    async fn send_command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RequestError::EngineClosed)
    }
}

/// Sole owner of the correlator. Every status is published from here.
struct Actor {
    correlator: Correlator,
    channel: Arc<dyn Channel>,
    statuses: broadcast::Sender<OperationStatus>,
    operation_timeout: Duration,
    deadline: Option<Instant>,
}

impl Actor {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>, mut events: EventStream) {
        let mut events_open = true;
        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_event(event).await,
                    None => events_open = false,
                },
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.deadline = None;
                    if let Some(status) = self.correlator.timeout() {
                        self.publish(status);
                    }
                }
            }
        }
        debug!("engine stopped: all handles dropped");
        self.channel.close().await;
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Begin(request, reply) => {
                let outcome = self.begin(request).await;
                let _ = reply.send(outcome);
            }
            Command::Abort(reply) => {
                let outcome = match self.correlator.abort(Utc::now()) {
                    Ok(wire) => {
                        self.channel.send(&wire).await;
                        Ok(())
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(outcome);
            }
            Command::Close(reply) => {
                self.deadline = None;
                let status = self.correlator.close();
                self.channel.close().await;
                self.publish(status);
                let _ = reply.send(());
            }
        }
    }

    async fn begin(&mut self, request: Request) -> Result<String> {
        if self.correlator.is_pending() {
            return Err(RequestError::OperationInProgress);
        }
        if !self.channel.is_connected() {
            let kind = request.kind();
            warn!(%kind, "request refused: terminal not connected");
            self.publish(OperationStatus::error(
                ErrorReason::NotInitialised,
                format!("cannot start {kind}: terminal not connected"),
                None,
            ));
            return Err(RequestError::NotInitialised);
        }

        let begun = match self.correlator.begin(&request, Utc::now()) {
            Ok(begun) => begun,
            Err(err @ RequestError::OperationInProgress) => return Err(err),
            Err(err) => {
                let kind = request.kind();
                warn!(%kind, error = %err, "request refused: cannot be built");
                self.publish(OperationStatus::error(
                    ErrorReason::DataHandling,
                    format!("cannot start {kind}: {err}"),
                    request_input(&request),
                ));
                return Err(err);
            }
        };
        self.channel.send(&begun.wire).await;
        self.deadline = Some(Instant::now() + self.operation_timeout);
        self.publish(begun.status);
        Ok(begun.request_id)
    }

    async fn on_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(text) => {
                let step = self.correlator.handle_inbound(&text, Utc::now());
                for reply in &step.outbound {
                    self.channel.send(reply).await;
                }
                for status in step.statuses {
                    self.publish(status);
                }
                if !self.correlator.is_pending() {
                    self.deadline = None;
                }
            }
            ChannelEvent::ConnectionChanged(state) => {
                info!(%state, pending = self.correlator.is_pending(), "terminal connection changed");
            }
            ChannelEvent::Error(TransportError::NotConnected) => {
                warn!("message not delivered: terminal not connected");
            }
            ChannelEvent::Error(err) => {
                warn!(error = %err, "transport error");
            }
        }
    }

    fn publish(&self, status: OperationStatus) {
        trace!(status = status.name(), "publishing status");
        if self.statuses.send(status).is_err() {
            trace!("status dropped: no subscribers");
        }
    }
}

/// The caller-supplied values a request is built from.
fn request_input(request: &Request) -> Option<String> {
    match request {
        Request::Payment { amount, currency } | Request::Refund { amount, currency } => {
            Some(format!("{amount} {currency}"))
        }
        Request::Reversal { reference_id } => Some(reference_id.clone()),
        Request::Login | Request::Logoff | Request::Reconciliation => None,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
