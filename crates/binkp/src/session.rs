//! The binkp session state machine.
//!
//! Drives one session over any byte stream: handshake, option
//! negotiation, authentication, the interleaved transfer batch, EOB
//! convergence and teardown. The stream is split and framed per
//! direction; writes are buffered into the encoder and flushed while
//! reads are pending, so a session never wedges against a peer that is
//! itself mid-send.

use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};

use ftn_dtyp::Address;

use crate::cram::{self, CramChallenge};
use crate::frame::{Command, Frame};
use crate::options::{negotiate, NegotiatedOptions, OptionPrefs, PeerOptions};
use crate::transfer::TransferBatch;
use crate::wire::{BinkpDecoder, BinkpEncoder, LinkStats};
use crate::{Error, Result};

/// Backpressure boundary for the write buffer; outbound frames are
/// prepared only while the buffer is below this.
const WRITE_HIGH_WATER: usize = 64 * 1024;

/// Which end of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Originator,
    Answerer,
}

/// Session lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    AuthWait,
    AuthSent,
    Ready,
    Xfer,
    EobSent,
    EobAcked,
    Closing,
}

/// Static per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Addresses we present in M_ADR.
    pub addresses: Vec<Address>,
    pub system_name: String,
    pub sysop: String,
    /// Link password; empty means an insecure session.
    pub password: String,
    /// Accept/send a plaintext M_PWD when no CRAM challenge is in play.
    pub allow_plain_password: bool,
    pub options: OptionPrefs,
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            addresses: Vec::new(),
            system_name: "ftn-rs".into(),
            sysop: "sysop".into(),
            password: String::new(),
            allow_plain_password: false,
            options: OptionPrefs::default(),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// What a completed session produced.
#[derive(Debug)]
pub struct SessionOutcome {
    pub remote_addresses: Vec<Address>,
    pub secure: bool,
    pub options: NegotiatedOptions,
    /// Local paths the peer acknowledged.
    pub sent: Vec<PathBuf>,
    /// Local paths the peer skipped.
    pub skipped: Vec<PathBuf>,
    /// Final paths of files received from the peer.
    pub received: Vec<PathBuf>,
    pub stats_in: LinkStats,
    pub stats_out: LinkStats,
}

/// A single binkp session over stream `S`.
pub struct Session<S> {
    reader: FramedRead<ReadHalf<S>, BinkpDecoder>,
    writer: FramedWrite<WriteHalf<S>, BinkpEncoder>,
    config: SessionConfig,
    role: Role,
    phase: Phase,
    batch: TransferBatch,

    peer_options: PeerOptions,
    remote_addresses: Vec<Address>,
    challenge: Option<CramChallenge>,
    secure: bool,
    negotiated: NegotiatedOptions,
}

impl<S: AsyncRead + AsyncWrite> Session<S> {
    /// Runs a complete session: handshake, transfer, teardown.
    ///
    /// On a local error the peer is told with M_ERR before the
    /// connection drops; partial inbound files stay on disk in their
    /// temp form for a later resume.
    pub async fn run(
        stream: S,
        role: Role,
        config: SessionConfig,
        batch: TransferBatch,
    ) -> Result<SessionOutcome> {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut session = Session {
            reader: FramedRead::new(read_half, BinkpDecoder::new()),
            writer: FramedWrite::new(write_half, BinkpEncoder::new()),
            config,
            role,
            phase: Phase::Init,
            batch,
            peer_options: PeerOptions::default(),
            remote_addresses: Vec::new(),
            challenge: None,
            secure: false,
            negotiated: NegotiatedOptions::default(),
        };

        let result = session.drive().await;
        match result {
            Ok(()) => {
                let _ = SinkExt::<Frame>::close(&mut session.writer).await;
                Ok(session.into_outcome())
            }
            Err(err) => {
                if err.report_to_peer() {
                    let report = Frame::command(Command::Err, err.to_string());
                    let _ = timeout(Duration::from_secs(10), async {
                        let _ = SinkExt::<Frame>::send(&mut session.writer, report).await;
                    })
                    .await;
                }
                let _ = SinkExt::<Frame>::close(&mut session.writer).await;
                Err(err)
            }
        }
    }

    fn into_outcome(self) -> SessionOutcome {
        SessionOutcome {
            remote_addresses: self.remote_addresses,
            secure: self.secure,
            options: self.negotiated,
            sent: self.batch.sent,
            skipped: self.batch.skipped,
            received: self.batch.received,
            stats_in: self.reader.decoder().stats(),
            stats_out: self.writer.encoder().stats(),
        }
    }

    async fn drive(&mut self) -> Result<()> {
        self.send_greeting().await?;
        self.authenticate().await?;
        self.transfer().await?;
        self.set_phase(Phase::Closing);
        SinkExt::<Frame>::flush(&mut self.writer).await?;
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase) {
        log::trace!("session phase {:?} -> {phase:?}", self.phase);
        self.phase = phase;
    }

    /// INIT: system info, our OPT advertisement (with the CRAM
    /// challenge on the answerer side), and our address list.
    async fn send_greeting(&mut self) -> Result<()> {
        let version = env!("CARGO_PKG_VERSION");
        self.enqueue(Frame::command(
            Command::Nul,
            format!("SYS {}", self.config.system_name),
        ))?;
        self.enqueue(Frame::command(
            Command::Nul,
            format!("ZYZ {}", self.config.sysop),
        ))?;
        self.enqueue(Frame::command(
            Command::Nul,
            format!("VER ftn-rs/{version} binkp/1.0"),
        ))?;

        let mut tokens: Vec<String> = self
            .config
            .options
            .advertised_tokens()
            .into_iter()
            .map(str::to_string)
            .collect();
        if self.role == Role::Answerer && !self.config.password.is_empty() {
            let challenge = CramChallenge::generate();
            tokens.extend(challenge.opt_tokens());
            self.challenge = Some(challenge);
        }
        if !tokens.is_empty() {
            self.enqueue(Frame::command(
                Command::Nul,
                format!("OPT {}", tokens.join(" ")),
            ))?;
        }

        let addresses = self
            .config
            .addresses
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.enqueue(Frame::command(Command::Adr, addresses))?;
        SinkExt::<Frame>::flush(&mut self.writer).await?;
        self.set_phase(Phase::AuthWait);
        Ok(())
    }

    /// AUTH_WAIT/AUTH_SENT: exchange addresses and the password proof.
    /// The negotiated option set is fixed the moment authentication
    /// succeeds, on both sides.
    async fn authenticate(&mut self) -> Result<()> {
        loop {
            let frame = self.read_frame().await?;
            match frame {
                Frame::Command(Command::Nul, argument) => self.absorb_nul(&argument),
                Frame::Command(Command::Adr, argument) => {
                    self.remote_addresses = parse_address_list(&argument)?;
                    log::debug!("peer presents {:?}", self.remote_addresses);
                    if self.role == Role::Originator {
                        let proof = self.password_proof()?;
                        self.enqueue(Frame::command(Command::Pwd, proof))?;
                        SinkExt::<Frame>::flush(&mut self.writer).await?;
                        self.set_phase(Phase::AuthSent);
                    }
                }
                Frame::Command(Command::Pwd, argument) => {
                    if self.role != Role::Answerer {
                        return Err(Error::Protocol("M_PWD from the answerer".into()));
                    }
                    if self.remote_addresses.is_empty() {
                        return Err(Error::Protocol("M_PWD before M_ADR".into()));
                    }
                    self.verify_password(&argument)?;
                    let status = if self.secure { "secure" } else { "non-secure" };
                    self.enqueue(Frame::command(Command::Ok, status))?;
                    SinkExt::<Frame>::flush(&mut self.writer).await?;
                    // M_OK travels under the pre-negotiation codec; only
                    // frames after it are CRC-sealed or compressed.
                    self.activate_options()?;
                    self.set_phase(Phase::Ready);
                    return Ok(());
                }
                Frame::Command(Command::Ok, argument) => {
                    if self.role != Role::Originator {
                        return Err(Error::Protocol("M_OK from the originator".into()));
                    }
                    self.secure = argument.trim() == "secure";
                    self.activate_options()?;
                    self.set_phase(Phase::Ready);
                    return Ok(());
                }
                Frame::Command(Command::Err, argument) => return Err(Error::Remote(argument)),
                Frame::Command(Command::Bsy, argument) => return Err(Error::Busy(argument)),
                other => {
                    return Err(Error::Protocol(format!(
                        "{other} during authentication"
                    )))
                }
            }
        }
    }

    /// The M_PWD argument we present as originator.
    fn password_proof(&self) -> Result<String> {
        if self.config.password.is_empty() {
            return Ok("-".into());
        }
        if let Some((algorithm, nonce)) = &self.peer_options.cram {
            return Ok(cram::response(*algorithm, &self.config.password, nonce));
        }
        if self.config.allow_plain_password {
            log::warn!("peer offers no CRAM; sending plaintext password");
            return Ok(self.config.password.clone());
        }
        Err(Error::Auth(
            "peer offers no CRAM and plaintext passwords are disabled".into(),
        ))
    }

    /// Answerer-side M_PWD verification.
    fn verify_password(&mut self, argument: &str) -> Result<()> {
        let argument = argument.trim();
        if self.config.password.is_empty() {
            self.secure = false;
            return Ok(());
        }
        if argument.starts_with("CRAM-") {
            let challenge = self
                .challenge
                .as_ref()
                .ok_or_else(|| Error::Auth("CRAM response without a challenge".into()))?;
            cram::verify(&self.config.password, &challenge.nonce, argument)?;
            self.secure = true;
            return Ok(());
        }
        if self.config.allow_plain_password && argument == self.config.password {
            self.secure = true;
            return Ok(());
        }
        Err(Error::Auth("bad password".into()))
    }

    /// Fixes the option set and arms the codecs and the batch.
    fn activate_options(&mut self) -> Result<()> {
        let negotiated = negotiate(&self.config.options, &self.peer_options)?;
        if negotiated.crc {
            self.reader.decoder_mut().enable_crc();
            self.writer.encoder_mut().enable_crc();
        }
        if negotiated.plz {
            let level = self.config.options.plz_level;
            self.reader.decoder_mut().enable_plz(level);
            self.writer.encoder_mut().enable_plz(level);
        }
        self.batch.set_options(negotiated);
        self.negotiated = negotiated;
        log::debug!(
            "session options: nr={} crc={} plz={}",
            negotiated.nr,
            negotiated.crc,
            negotiated.plz
        );
        Ok(())
    }

    /// XFER through EOB_ACKED: pump both directions until both sides
    /// have sent M_EOB and no transfer is in flight.
    async fn transfer(&mut self) -> Result<()> {
        self.set_phase(Phase::Xfer);
        let mut sent_eob = false;
        let mut peer_eob = false;

        loop {
            while self.writer.write_buffer().len() < WRITE_HIGH_WATER
                && self.batch.has_send_work()
            {
                let chunk = self.writer.encoder().max_data_chunk();
                match self.batch.next_frame(chunk).await? {
                    Some(frame) => self.enqueue(frame)?,
                    None => break,
                }
            }
            if !sent_eob && self.batch.outbound_done() {
                self.enqueue(Frame::command(Command::Eob, ""))?;
                sent_eob = true;
                self.set_phase(Phase::EobSent);
            }
            if sent_eob
                && peer_eob
                && self.batch.inbound_idle()
                && self.writer.write_buffer().is_empty()
            {
                self.set_phase(Phase::EobAcked);
                return Ok(());
            }

            let writer_dirty = !self.writer.write_buffer().is_empty();
            tokio::select! {
                biased;
                frame = timeout(self.config.idle_timeout, self.reader.next()) => {
                    let frame = match frame {
                        Err(_) => return Err(Error::IdleTimeout),
                        Ok(None) => {
                            return Err(Error::Protocol(
                                "connection closed mid-session".into(),
                            ))
                        }
                        Ok(Some(frame)) => frame?,
                    };
                    match frame {
                        Frame::Command(Command::Nul, argument) => self.absorb_nul(&argument),
                        Frame::Command(Command::Eob, _) => {
                            if !self.batch.inbound_idle() {
                                return Err(Error::Protocol(
                                    "M_EOB inside a file transfer".into(),
                                ));
                            }
                            peer_eob = true;
                        }
                        Frame::Command(Command::Err, argument) => {
                            return Err(Error::Remote(argument))
                        }
                        Frame::Command(Command::Bsy, argument) => {
                            return Err(Error::Busy(argument))
                        }
                        other => {
                            for reply in self.batch.handle_frame(other).await? {
                                self.enqueue(reply)?;
                            }
                        }
                    }
                }
                result = SinkExt::<Frame>::flush(&mut self.writer), if writer_dirty => {
                    result?;
                }
            }
        }
    }

    fn absorb_nul(&mut self, argument: &str) {
        match argument.split_once(' ') {
            Some(("OPT", options)) => self.peer_options.absorb(options),
            _ => log::debug!("peer: {argument}"),
        }
    }

    /// Buffers a frame into the encoder without touching the socket.
    fn enqueue(&mut self, frame: Frame) -> Result<()> {
        log::trace!("send {frame}");
        Pin::new(&mut self.writer).start_send(frame)
    }

    /// One frame from the peer, bounded by the idle timeout.
    async fn read_frame(&mut self) -> Result<Frame> {
        match timeout(self.config.idle_timeout, self.reader.next()).await {
            Err(_) => Err(Error::IdleTimeout),
            Ok(None) => Err(Error::Protocol("connection closed by peer".into())),
            Ok(Some(frame)) => {
                let frame = frame?;
                log::trace!("recv {frame}");
                Ok(frame)
            }
        }
    }
}

/// Parses an M_ADR argument: space-separated addresses, each optionally
/// carrying an `@domain` suffix.
fn parse_address_list(argument: &str) -> Result<Vec<Address>> {
    let mut addresses = Vec::new();
    for token in argument.split_whitespace() {
        let bare = token.split('@').next().unwrap_or(token);
        match bare.parse::<Address>() {
            Ok(address) => addresses.push(address),
            Err(e) => log::debug!("skipping unparsable address {token}: {e}"),
        }
    }
    if addresses.is_empty() {
        return Err(Error::Protocol(format!(
            "no usable address in M_ADR {argument:?}"
        )));
    }
    Ok(addresses)
}
