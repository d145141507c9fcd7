//! Minimal terminal simulator for the server topology.
//!
//! Dials a POS listening on `127.0.0.1:<port>` and approves everything it is
//! asked to do, printing a display line and a receipt on the way.
//!
//! Run with:
//!   cargo run --example mock-terminal -- 20002
//!
//! In another terminal:
//!   cargo run --features cli -- --topology server --port 20002 \
//!     pay --amount 1250 --currency EUR

use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use opilink::frame::{FrameReader, FrameWriter};
use opilink::message::{
    decode, serialize, Authorisation, CardRequestType, CardServiceRequest, CardServiceResponse,
    DeviceRequest, DeviceRequestType, DeviceTarget, OpiMessage, Output, OverallResult,
    ServiceRequest, ServiceResponse, Tender, Terminal,
};

const TERMINAL_ID: &str = "52000011";

struct Session {
    reader: FrameReader<TcpStream>,
    writer: FrameWriter<TcpStream>,
    device_requests: u32,
    stan: u32,
}

impl Session {
    fn send(&mut self, message: &OpiMessage) -> Result<(), Box<dyn std::error::Error>> {
        self.writer.send(&serialize(message)?)?;
        Ok(())
    }

    /// Send a device output and wait for the POS to acknowledge it.
    fn output(
        &mut self,
        target: DeviceTarget,
        lines: &[String],
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.device_requests += 1;
        let request_id = format!("d-{}", self.device_requests);
        self.send(&OpiMessage::DeviceRequest(DeviceRequest {
            request_type: DeviceRequestType::Output,
            application_sender: Some("EPS".into()),
            workstation_id: None,
            request_id: request_id.clone(),
            output: Some(Output {
                target,
                text_lines: lines.to_vec(),
            }),
        }))?;

        match self.reader.read_frame()? {
            Some(raw) => match decode(&raw)? {
                OpiMessage::DeviceResponse(ack) if ack.request_id.as_deref() == Some(&request_id) => {
                    Ok(())
                }
                other => Err(format!("expected ack for {request_id}, got {other:?}").into()),
            },
            None => Err("POS closed the connection".into()),
        }
    }

    fn on_service(&mut self, request: ServiceRequest) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!("{:?} request {}", request.request_type, request.request_id);
        self.output(
            DeviceTarget::CashierDisplay,
            &[format!("{:?} in progress", request.request_type)],
        )?;
        self.send(&OpiMessage::ServiceResponse(ServiceResponse {
            request_type: request.request_type,
            application_sender: Some(request.application_sender),
            workstation_id: Some(request.workstation_id),
            request_id: Some(request.request_id),
            overall_result: OverallResult::Success,
            terminal: Some(Terminal {
                terminal_id: TERMINAL_ID.into(),
                terminal_batch: Some("1".into()),
                stan: None,
            }),
        }))
    }

    fn on_card(&mut self, request: CardServiceRequest) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!("{:?} request {}", request.request_type, request.request_id);
        if request.request_type == CardRequestType::AbortRequest {
            // Requests are served one at a time; there is never anything left to abort.
            return self.send(&OpiMessage::CardServiceResponse(CardServiceResponse {
                request_type: request.request_type,
                application_sender: Some(request.application_sender),
                workstation_id: Some(request.workstation_id),
                request_id: Some(request.request_id),
                overall_result: OverallResult::Failure,
                terminal: None,
                tender: None,
            }));
        }

        let amount = request
            .total_amount
            .as_ref()
            .map(|amount| format!("{} {}", amount.currency, amount.value))
            .unwrap_or_default();
        self.output(DeviceTarget::CashierDisplay, &["Present card".to_string()])?;
        self.output(
            DeviceTarget::Printer,
            &[format!("{:?}", request.request_type), amount, "APPROVED".into()],
        )?;

        self.stan += 1;
        self.send(&OpiMessage::CardServiceResponse(CardServiceResponse {
            request_type: request.request_type,
            application_sender: Some(request.application_sender),
            workstation_id: Some(request.workstation_id),
            request_id: Some(request.request_id),
            overall_result: OverallResult::Success,
            terminal: Some(Terminal {
                terminal_id: TERMINAL_ID.into(),
                terminal_batch: Some("1".into()),
                stan: Some(self.stan.to_string()),
            }),
            tender: Some(Tender {
                total_amount: request.total_amount,
                authorisation: Some(Authorisation {
                    acquirer_id: Some("MOCK".into()),
                    card_pan: Some("476173******0010".into()),
                    card_circuit: Some("VISA".into()),
                    approval_code: Some("123456".into()),
                }),
            }),
        }))
    }

    fn serve(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        while let Some(raw) = self.reader.read_frame()? {
            match decode(&raw) {
                Ok(OpiMessage::ServiceRequest(request)) => self.on_service(request)?,
                Ok(OpiMessage::CardServiceRequest(request)) => self.on_card(request)?,
                Ok(other) => eprintln!("ignoring {:?}", other.kind()),
                Err(e) => eprintln!("undecodable message: {e}"),
            }
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port: u16 = match std::env::args().nth(1) {
        Some(port) => port.parse()?,
        None => 20002,
    };

    let mut stan = 0;
    loop {
        let stream = match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => stream,
            Err(_) => {
                thread::sleep(Duration::from_millis(500));
                continue;
            }
        };
        eprintln!("Connected to POS on port {port}");

        let mut session = Session {
            reader: FrameReader::new(stream.try_clone()?),
            writer: FrameWriter::new(stream),
            device_requests: 0,
            stan,
        };
        if let Err(e) = session.serve() {
            eprintln!("session ended: {e}");
        } else {
            eprintln!("POS disconnected");
        }
        stan = session.stan;
    }
}
