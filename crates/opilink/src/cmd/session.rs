//! One CLI invocation: open, optionally log in, run a request, close.

use opilink_engine::{OperationKind, OperationStatus, OpiEngine, Request, RequestError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::cmd::ConnectionArgs;
use crate::exit::{io_error, request_error, status_code, CliError, CliResult, CANCELLED, INTERNAL};
use crate::output::{print_status, OutputFormat};

pub fn run(
    connection: &ConnectionArgs,
    format: OutputFormat,
    request: Request,
    login_first: bool,
) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    runtime.block_on(drive(connection, format, request, login_first))
}

async fn drive(
    connection: &ConnectionArgs,
    format: OutputFormat,
    request: Request,
    login_first: bool,
) -> CliResult<i32> {
    let engine = connection.engine();
    let endpoint = connection.endpoint();
    let mut statuses = engine.subscribe();

    info!(%endpoint, topology = ?connection.topology, "opening terminal connection");
    if let Err(err) = engine.open_and_wait(connection.connect_timeout).await {
        engine.close().await;
        return Err(request_error(
            &format!("cannot reach terminal at {endpoint}"),
            err,
        ));
    }

    let outcome = operate(&engine, &mut statuses, format, request, login_first).await;
    engine.close().await;
    outcome
}

async fn operate(
    engine: &OpiEngine,
    statuses: &mut broadcast::Receiver<OperationStatus>,
    format: OutputFormat,
    request: Request,
    login_first: bool,
) -> CliResult<i32> {
    if login_first {
        let status = perform(engine, statuses, format, Request::Login).await?;
        if status != OperationStatus::LoggedIn {
            warn!(status = status.name(), "login failed; operation not started");
            return Ok(status_code(&status));
        }
    }
    let status = perform(engine, statuses, format, request).await?;
    Ok(status_code(&status))
}

/// Issue `request` and print statuses until the final one.
async fn perform(
    engine: &OpiEngine,
    statuses: &mut broadcast::Receiver<OperationStatus>,
    format: OutputFormat,
    request: Request,
) -> CliResult<OperationStatus> {
    let kind = request.kind();
    match engine.begin(request).await {
        Ok(request_id) => debug!(%kind, %request_id, "request sent"),
        // The refusal is also published; print it and exit with its code.
        Err(RequestError::NotInitialised) => {}
        Err(err) => return Err(request_error(&format!("cannot start {kind}"), err)),
    }
    until_final(engine, statuses, format, kind).await
}

async fn until_final(
    engine: &OpiEngine,
    statuses: &mut broadcast::Receiver<OperationStatus>,
    format: OutputFormat,
    kind: OperationKind,
) -> CliResult<OperationStatus> {
    let mut abort_requested = false;
    loop {
        tokio::select! {
            received = statuses.recv() => match received {
                Ok(status) => {
                    print_status(&status, kind, format);
                    if status.is_final() {
                        return Ok(status);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "status output fell behind");
                }
                Err(RecvError::Closed) => {
                    return Err(CliError::new(INTERNAL, "engine stopped unexpectedly"));
                }
            },
            signal = tokio::signal::ctrl_c(), if !abort_requested => {
                if let Err(err) = signal {
                    return Err(io_error("failed to listen for ctrl-c", err));
                }
                abort_requested = true;
                info!(%kind, "interrupted; asking the terminal to abort");
                if let Err(err) = engine.abort().await {
                    warn!(error = %err, "abort not sent");
                    return Err(CliError::new(CANCELLED, format!("{kind} interrupted")));
                }
            }
        }
    }
}
