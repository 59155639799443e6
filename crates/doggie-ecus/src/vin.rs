//! Diagnostic (VIN) ECU
//!
//! Answers two requests over ISO-TP with the stored secret:
//!
//! | Request    | Service                                  |
//! |------------|------------------------------------------|
//! | `09 02`    | OBD mode 09, PID 02 (request VIN)        |
//! | `22 F1 90` | UDS ReadDataByIdentifier, DID 0xF190 VIN |
//!
//! The response is the secret bytes alone, with no positive-response header.
//! Every other request is ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use doggie_core::isotp::IsoTpError;
use doggie_core::{IsoTpConfig, IsoTpSocket, Notifier, SharedBus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ecu::{join_within, Lifecycle, STOP_TIMEOUT};
use crate::error::EcuError;

pub const DEFAULT_SECRET: &str = "flag{sarasaVIN123456789}";

const OBD_REQUEST_VIN: &[u8] = &[0x09, 0x02];
const UDS_READ_VIN: &[u8] = &[0x22, 0xF1, 0x90];

/// Pure request/response mapping of the diagnostic service
#[derive(Debug, Clone)]
pub struct DiagnosticResponder {
    secret: Vec<u8>,
}

impl DiagnosticResponder {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Response for `request`, or `None` when it gets no answer
    pub fn respond(&self, request: &[u8]) -> Option<&[u8]> {
        if request == OBD_REQUEST_VIN || request == UDS_READ_VIN {
            Some(&self.secret)
        } else {
            None
        }
    }
}

impl Default for DiagnosticResponder {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET)
    }
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Diagnostic ECU: an ISO-TP socket plus a request loop
pub struct DiagnosticEcu {
    bus: SharedBus,
    notifier: Arc<Notifier>,
    config: IsoTpConfig,
    responder: Arc<DiagnosticResponder>,
    running: Arc<AtomicBool>,
    task: Option<RunningTask>,
}

impl DiagnosticEcu {
    pub fn new(
        bus: SharedBus,
        notifier: Arc<Notifier>,
        config: IsoTpConfig,
        responder: DiagnosticResponder,
    ) -> Self {
        Self {
            bus,
            notifier,
            config,
            responder: Arc::new(responder),
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn config(&self) -> &IsoTpConfig {
        &self.config
    }
}

#[async_trait]
impl Lifecycle for DiagnosticEcu {
    fn name(&self) -> &str {
        "VIN ECU"
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn start(&mut self) -> Result<(), EcuError> {
        if self.task.is_some() {
            return Ok(());
        }

        let socket = IsoTpSocket::open(self.bus.clone(), &self.notifier, self.config.clone())?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(serve(
            socket,
            self.responder.clone(),
            shutdown_rx,
            self.running.clone(),
        ));

        self.task = Some(RunningTask { shutdown, handle });
        self.running.store(true, Ordering::SeqCst);
        info!(
            ecu = %self.name(),
            rx_id = format!("0x{:03X}", self.config.rx_id),
            tx_id = format!("0x{:03X}", self.config.tx_id),
            "ECU started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EcuError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        self.running.store(false, Ordering::SeqCst);
        let _ = task.shutdown.send(true);

        join_within(self.name(), task.handle, STOP_TIMEOUT).await?;
        info!(ecu = %self.name(), "ECU stopped");
        Ok(())
    }
}

impl Drop for DiagnosticEcu {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.handle.abort();
        }
    }
}

async fn serve(
    mut socket: IsoTpSocket,
    responder: Arc<DiagnosticResponder>,
    mut shutdown: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            request = socket.recv() => request,
        };

        let request = match request {
            Ok(request) => request,
            Err(IsoTpError::ListenerClosed) => {
                warn!("VIN ECU listener closed");
                running.store(false, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                warn!(error = %e, "Diagnostic receive failed");
                continue;
            }
        };

        debug!(request = %hex::encode(&request), "Diagnostic request");
        let Some(response) = responder.respond(&request) else {
            continue;
        };

        if let Err(e) = socket.send(response).await {
            warn!(error = %e, "Diagnostic response failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use doggie_core::VirtualCanBus;
    use doggie_core::ids::{VIN_ECU_RX_ID, VIN_ECU_TX_ID};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[0x09, 0x02], true)]
    #[case(&[0x22, 0xF1, 0x90], true)]
    #[case(&[0x22, 0xF1, 0x91], false)]
    #[case(&[0x09, 0x02, 0x00], false)]
    #[case(&[0x09], false)]
    #[case(&[0x3E, 0x00], false)]
    fn test_responder(#[case] request: &[u8], #[case] answered: bool) {
        let responder = DiagnosticResponder::default();
        let expected = answered.then_some(DEFAULT_SECRET.as_bytes());
        assert_eq!(responder.respond(request), expected);
    }

    #[tokio::test]
    async fn test_secret_over_isotp() {
        let vcan = VirtualCanBus::new("vcan0");
        let ecu_bus: SharedBus = Arc::new(vcan.open("ecus"));
        let ecu_notifier = Arc::new(Notifier::new(ecu_bus.clone()));
        ecu_notifier.start();

        let tester_bus: SharedBus = Arc::new(vcan.open("tester"));
        let tester_notifier = Arc::new(Notifier::new(tester_bus.clone()));
        tester_notifier.start();

        let mut ecu = DiagnosticEcu::new(
            ecu_bus,
            ecu_notifier.clone(),
            IsoTpConfig::new(VIN_ECU_RX_ID, VIN_ECU_TX_ID),
            DiagnosticResponder::default(),
        );
        ecu.start().await.unwrap();
        assert!(ecu.is_running());

        let mut tester = IsoTpSocket::open(
            tester_bus,
            &tester_notifier,
            IsoTpConfig::new(VIN_ECU_TX_ID, VIN_ECU_RX_ID),
        )
        .unwrap();

        tester.send(&[0x22, 0xF1, 0x90]).await.unwrap();
        let response = tester
            .recv_timeout(Duration::from_secs(2))
            .await
            .unwrap()
            .expect("no response");
        assert_eq!(response, DEFAULT_SECRET.as_bytes());

        tester.send(&[0x22, 0xF1, 0x91]).await.unwrap();
        let none = tester
            .recv_timeout(Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(none, None);

        ecu.stop().await.unwrap();
        assert!(!ecu.is_running());
        drop(tester);
        tester_notifier.stop().await;
        ecu_notifier.stop().await;
    }

    #[tokio::test]
    async fn test_restart() {
        let vcan = VirtualCanBus::new("vcan0");
        let bus: SharedBus = Arc::new(vcan.open("ecus"));
        let notifier = Arc::new(Notifier::new(bus.clone()));
        notifier.start();

        let mut ecu = DiagnosticEcu::new(
            bus,
            notifier.clone(),
            IsoTpConfig::new(VIN_ECU_RX_ID, VIN_ECU_TX_ID),
            DiagnosticResponder::new("other"),
        );
        ecu.start().await.unwrap();
        assert_eq!(notifier.listener_count(), 1);
        ecu.stop().await.unwrap();
        assert_eq!(notifier.listener_count(), 0);
        ecu.start().await.unwrap();
        assert_eq!(notifier.listener_count(), 1);
        ecu.stop().await.unwrap();
        notifier.stop().await;
    }
}
