//! Async ISO-TP endpoint

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::pci::{self, FlowStatus, Pdu, Reassembler};
use super::{IsoTpConfig, IsoTpError};
use crate::frame::CanFrame;
use crate::notifier::{ListenerId, Notifier};
use crate::transport::SharedBus;

/// One ISO-TP endpoint bound to a fixed (rx-id, tx-id) pair
///
/// The socket registers a notifier listener on open and removes it on drop.
/// It is half-duplex: while a send is waiting for flow control, incoming
/// single and first frames are discarded.
pub struct IsoTpSocket {
    config: IsoTpConfig,
    bus: SharedBus,
    notifier: Arc<Notifier>,
    listener: ListenerId,
    inbox: mpsc::UnboundedReceiver<CanFrame>,
}

impl IsoTpSocket {
    pub fn open(
        bus: SharedBus,
        notifier: &Arc<Notifier>,
        config: IsoTpConfig,
    ) -> Result<Self, IsoTpError> {
        config.validate()?;
        let (listener, inbox) = notifier.add_listener();

        debug!(
            rx_id = format!("0x{:03X}", config.rx_id),
            tx_id = format!("0x{:03X}", config.tx_id),
            "ISO-TP socket opened"
        );

        Ok(Self {
            config,
            bus,
            notifier: notifier.clone(),
            listener,
            inbox,
        })
    }

    pub fn config(&self) -> &IsoTpConfig {
        &self.config
    }

    /// Wait indefinitely for the next complete message
    pub async fn recv(&mut self) -> Result<Vec<u8>, IsoTpError> {
        loop {
            let frame = self.inbox.recv().await.ok_or(IsoTpError::ListenerClosed)?;
            if let Some(payload) = self.handle_idle_frame(&frame).await? {
                return Ok(payload);
            }
        }
    }

    /// Wait up to `timeout` for a message to begin; `Ok(None)` if none does
    ///
    /// Once a first frame has arrived, consecutive frames are governed by
    /// `n_cr` rather than `timeout`.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, IsoTpError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.inbox.recv()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(IsoTpError::ListenerClosed),
                Ok(Some(frame)) => frame,
            };
            if let Some(payload) = self.handle_idle_frame(&frame).await? {
                return Ok(Some(payload));
            }
        }
    }

    /// Send a payload, segmenting it when it exceeds one frame
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), IsoTpError> {
        if payload.is_empty() {
            return Err(IsoTpError::EmptyPayload);
        }
        if payload.len() > self.config.max_payload_len {
            return Err(IsoTpError::PayloadTooLarge {
                len: payload.len(),
                max: self.config.max_payload_len,
            });
        }

        if payload.len() <= pci::SF_MAX_DATA {
            let data = pci::single_frame(payload, self.config.padding);
            return self.transmit(data).await;
        }

        let (first, chunks) = pci::segment(payload);
        self.transmit(pci::first_frame(payload.len(), first)).await?;
        trace!(len = payload.len(), "ISO-TP first frame sent");

        let mut chunks = chunks.peekable();
        let mut sequence: u8 = 1;
        while chunks.peek().is_some() {
            let (block_size, st_min) = self.await_clear_to_send().await?;
            let separation = pci::st_min_duration(st_min);

            let mut sent_in_block: u16 = 0;
            while let Some(chunk) = chunks.next() {
                let data = pci::consecutive_frame(sequence, chunk, self.config.padding);
                self.transmit(data).await?;
                sequence = sequence.wrapping_add(1) & 0x0F;
                sent_in_block += 1;

                if chunks.peek().is_none() {
                    break;
                }
                if block_size != 0 && sent_in_block == block_size as u16 {
                    break;
                }
                if !separation.is_zero() {
                    tokio::time::sleep(separation).await;
                }
            }
        }

        debug!(len = payload.len(), "ISO-TP multi-frame message sent");
        Ok(())
    }

    async fn transmit(&self, data: Vec<u8>) -> Result<(), IsoTpError> {
        let frame = CanFrame::from_parts(self.config.tx_id, data);
        self.bus.send(&frame).await?;
        Ok(())
    }

    /// Next frame on our rx id, or a timeout error
    async fn next_frame(
        &mut self,
        timeout: Duration,
        what: &'static str,
    ) -> Result<CanFrame, IsoTpError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.inbox.recv()).await {
                Err(_) => return Err(IsoTpError::Timeout(what)),
                Ok(None) => return Err(IsoTpError::ListenerClosed),
                Ok(Some(frame)) => frame,
            };
            if frame.id() == self.config.rx_id {
                return Ok(frame);
            }
        }
    }

    /// Wait for flow control permitting the next block
    async fn await_clear_to_send(&mut self) -> Result<(u8, u8), IsoTpError> {
        let mut waits: u8 = 0;
        loop {
            let frame = self.next_frame(self.config.n_bs, "flow control").await?;
            match pci::parse(frame.data()) {
                Ok(Pdu::FlowControl {
                    status: FlowStatus::ContinueToSend,
                    block_size,
                    st_min,
                }) => return Ok((block_size, st_min)),
                Ok(Pdu::FlowControl {
                    status: FlowStatus::Wait,
                    ..
                }) => {
                    waits += 1;
                    if waits > self.config.wft_max {
                        return Err(IsoTpError::WaitLimitExceeded(waits));
                    }
                }
                Ok(Pdu::FlowControl {
                    status: FlowStatus::Overflow,
                    ..
                }) => return Err(IsoTpError::Overflow),
                Ok(other) => trace!(?other, "ignoring non flow-control PDU while sending"),
                Err(e) => debug!(error = %e, "ignoring malformed PDU while sending"),
            }
        }
    }

    /// Handle a frame while no reception is in progress
    async fn handle_idle_frame(
        &mut self,
        frame: &CanFrame,
    ) -> Result<Option<Vec<u8>>, IsoTpError> {
        if frame.id() != self.config.rx_id {
            return Ok(None);
        }

        match pci::parse(frame.data()) {
            Ok(Pdu::Single { data }) => Ok(Some(data.to_vec())),
            Ok(Pdu::First { total_len, data }) => {
                let reassembler = Reassembler::new(total_len, data);
                self.receive_multi_frame(reassembler).await
            }
            Ok(Pdu::Consecutive { .. }) | Ok(Pdu::FlowControl { .. }) => {
                trace!(%frame, "ignoring stray PDU");
                Ok(None)
            }
            Err(e) => {
                debug!(error = %e, %frame, "ignoring malformed PDU");
                Ok(None)
            }
        }
    }

    /// Receive the consecutive frames following a first frame
    ///
    /// A sequence error or timeout abandons the message and returns
    /// `Ok(None)` so the caller keeps listening.
    async fn receive_multi_frame(
        &mut self,
        mut reassembler: Reassembler,
    ) -> Result<Option<Vec<u8>>, IsoTpError> {
        let first_len = reassembler.total_len();
        if first_len > self.config.max_payload_len {
            let data = pci::flow_control(FlowStatus::Overflow, 0, 0, self.config.padding);
            self.transmit(data).await?;
            warn!(len = first_len, "ISO-TP message too large, sent overflow");
            return Ok(None);
        }

        self.send_clear_to_send().await?;

        let block_size = self.config.block_size;
        let mut in_block: u8 = 0;
        loop {
            let frame = match self.next_frame(self.config.n_cr, "consecutive frame").await {
                Ok(frame) => frame,
                Err(IsoTpError::Timeout(what)) => {
                    warn!("ISO-TP reception abandoned: timeout waiting for {}", what);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            match pci::parse(frame.data()) {
                Ok(Pdu::Consecutive { sequence, data }) => match reassembler.push(sequence, data) {
                    Ok(true) => return Ok(Some(reassembler.into_payload())),
                    Ok(false) => {
                        in_block = in_block.wrapping_add(1);
                        if block_size != 0 && in_block == block_size {
                            in_block = 0;
                            self.send_clear_to_send().await?;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "ISO-TP reception abandoned");
                        return Ok(None);
                    }
                },
                Ok(Pdu::Single { data }) => {
                    warn!("ISO-TP reception interrupted by a new single frame");
                    return Ok(Some(data.to_vec()));
                }
                Ok(Pdu::First { total_len, data }) => {
                    warn!("ISO-TP reception restarted by a new first frame");
                    reassembler = Reassembler::new(total_len, data);
                    in_block = 0;
                    self.send_clear_to_send().await?;
                }
                Ok(Pdu::FlowControl { .. }) => trace!("ignoring flow control while receiving"),
                Err(e) => debug!(error = %e, "ignoring malformed PDU while receiving"),
            }
        }
    }

    async fn send_clear_to_send(&self) -> Result<(), IsoTpError> {
        let data = pci::flow_control(
            FlowStatus::ContinueToSend,
            self.config.block_size,
            self.config.st_min,
            self.config.padding,
        );
        self.transmit(data).await
    }
}

impl Drop for IsoTpSocket {
    fn drop(&mut self) {
        self.notifier.remove_listener(self.listener);
    }
}
