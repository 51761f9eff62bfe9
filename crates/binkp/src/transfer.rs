//! The file-transfer batch engine.
//!
//! One batch per session, holding the queue of outgoing files and the
//! single in-progress incoming file. The session layer feeds inbound
//! frames to [`TransferBatch::handle_frame`] and drains outbound frames
//! from [`TransferBatch::next_frame`]; the engine enforces the
//! one-current-file-per-direction ordering of the protocol.
//!
//! Incoming files are written to `<name>.bpt` temp paths and renamed
//! into place only when complete, so an interrupted session leaves a
//! resumable partial behind rather than a corrupt final file.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::frame::{escape_filename, unescape_filename, Command, Frame};
use crate::options::NegotiatedOptions;
use crate::{Error, Result};

/// Suffix for in-progress inbound files.
const TEMP_SUFFIX: &str = ".bpt";

/// Read granularity for file checksumming and streaming.
const FILE_BUF: usize = 64 * 1024;

/// Lifecycle of a single file transfer, either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Sending,
    Receiving,
    WaitingAck,
    Completed,
    Error,
}

/// A file queued for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileToSend {
    pub path: PathBuf,
    /// Logical name announced to the peer.
    pub name: String,
    pub size: u64,
    /// Original modification time, UTC unix seconds.
    pub mtime: i64,
}

impl FileToSend {
    /// Describes an on-disk file for the outbound queue.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<FileToSend> {
        let path = path.into();
        let meta = fs::metadata(&path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Protocol(format!("unusable file name: {}", path.display())))?
            .to_string();
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(FileToSend {
            path,
            name,
            size: meta.len(),
            mtime,
        })
    }
}

/// The M_FILE/M_GET/M_GOT/M_SKIP argument fields.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileArgs {
    name: String,
    size: u64,
    mtime: i64,
    offset: Option<i64>,
    crc: Option<u32>,
}

impl FileArgs {
    /// Parses `name size [mtime [offset [crc]]]`, unescaping the name.
    fn parse(argument: &str, command: Command) -> Result<FileArgs> {
        let mut tokens = argument.split_whitespace();
        let bad = || Error::Protocol(format!("malformed {command} argument: {argument}"));
        let name = unescape_filename(tokens.next().ok_or_else(bad)?);
        let size = tokens.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let mtime = match tokens.next() {
            Some(t) => t.parse().map_err(|_| bad())?,
            None => 0,
        };
        let offset = match tokens.next() {
            Some(t) => Some(t.parse().map_err(|_| bad())?),
            None => None,
        };
        let crc = match tokens.next() {
            Some(t) => Some(
                u32::from_str_radix(t, 16).map_err(|_| bad())?,
            ),
            None => None,
        };
        Ok(FileArgs {
            name,
            size,
            mtime,
            offset,
            crc,
        })
    }
}

/// The current outgoing file.
#[derive(Debug)]
struct Outbound {
    meta: FileToSend,
    file: fs::File,
    /// Resume offset the stream started from.
    offset: u64,
    /// Bytes streamed past the offset.
    sent: u64,
    /// Whole-file CRC32, included in M_FILE when CRC is active.
    crc: Option<u32>,
    state: TransferState,
    /// Set by M_GET: re-announce from this offset.
    restart_at: Option<u64>,
    announced: bool,
}

/// The current incoming file.
#[derive(Debug)]
struct Inbound {
    name: String,
    size: u64,
    mtime: i64,
    offset: u64,
    received: u64,
    temp_path: PathBuf,
    final_path: PathBuf,
    file: fs::File,
    expected_crc: Option<u32>,
    state: TransferState,
}

/// Per-session transfer queues and state.
#[derive(Debug)]
pub struct TransferBatch {
    queue: VecDeque<FileToSend>,
    current_out: Option<Outbound>,
    current_in: Option<Inbound>,
    inbound_dir: PathBuf,
    options: NegotiatedOptions,
    /// Delete local files once the peer acknowledges them.
    delete_sent: bool,
    /// Name we asked the peer to re-announce via M_GET; data frames for
    /// the superseded announcement are discarded until it arrives.
    awaiting_restart: Option<String>,

    /// Local paths acknowledged by the peer (already deleted when
    /// `delete_sent` is set).
    pub sent: Vec<PathBuf>,
    /// Local paths the peer skipped; left on disk for a later session.
    pub skipped: Vec<PathBuf>,
    /// Final paths of completed inbound files.
    pub received: Vec<PathBuf>,
}

impl TransferBatch {
    pub fn new(inbound_dir: impl Into<PathBuf>) -> Self {
        TransferBatch {
            queue: VecDeque::new(),
            current_out: None,
            current_in: None,
            inbound_dir: inbound_dir.into(),
            options: NegotiatedOptions::default(),
            delete_sent: true,
            awaiting_restart: None,
            sent: Vec::new(),
            skipped: Vec::new(),
            received: Vec::new(),
        }
    }

    /// Keep sent files on disk instead of deleting them on M_GOT.
    pub fn keep_sent_files(mut self) -> Self {
        self.delete_sent = false;
        self
    }

    pub fn enqueue(&mut self, file: FileToSend) {
        self.queue.push_back(file);
    }

    /// Fixes the option set once the handshake settles.
    pub fn set_options(&mut self, options: NegotiatedOptions) {
        self.options = options;
    }

    /// Whether [`TransferBatch::next_frame`] may have something to emit.
    pub fn has_send_work(&self) -> bool {
        match &self.current_out {
            Some(out) => out.state == TransferState::Sending || out.restart_at.is_some(),
            None => !self.queue.is_empty(),
        }
    }

    /// True when every queued file has been announced, streamed and
    /// acknowledged.
    pub fn outbound_done(&self) -> bool {
        self.queue.is_empty() && self.current_out.is_none()
    }

    /// True when no inbound file is mid-transfer.
    pub fn inbound_idle(&self) -> bool {
        self.current_in.is_none() && self.awaiting_restart.is_none()
    }

    /// Produces the next outbound frame: an M_FILE announcement or a
    /// block of file data of at most `chunk` bytes.
    pub async fn next_frame(&mut self, chunk: usize) -> Result<Option<Frame>> {
        if self.current_out.is_none() {
            let Some(meta) = self.queue.pop_front() else {
                return Ok(None);
            };
            let crc = if self.options.crc {
                Some(file_crc32(&meta.path).await?)
            } else {
                None
            };
            let file = fs::File::open(&meta.path).await?;
            log::debug!("sending {} ({} bytes)", meta.name, meta.size);
            self.current_out = Some(Outbound {
                meta,
                file,
                offset: 0,
                sent: 0,
                crc,
                state: TransferState::Sending,
                restart_at: None,
                announced: false,
            });
        }

        let out = self.current_out.as_mut().expect("set above");

        if let Some(offset) = out.restart_at.take() {
            out.file.seek(std::io::SeekFrom::Start(offset)).await?;
            out.offset = offset;
            out.sent = 0;
            out.state = TransferState::Sending;
            out.announced = false;
        }

        if !out.announced {
            out.announced = true;
            let mut argument = format!(
                "{} {} {} {}",
                escape_filename(&out.meta.name),
                out.meta.size,
                out.meta.mtime,
                out.offset
            );
            if let Some(crc) = out.crc {
                argument.push_str(&format!(" {crc:08x}"));
            }
            return Ok(Some(Frame::command(Command::File, argument)));
        }

        if out.state != TransferState::Sending {
            return Ok(None);
        }

        let remaining = out.meta.size - out.offset - out.sent;
        if remaining == 0 {
            out.state = TransferState::WaitingAck;
            return Ok(None);
        }

        let want = remaining.min(chunk as u64) as usize;
        let mut buf = vec![0u8; want];
        out.file.read_exact(&mut buf).await.map_err(|e| {
            Error::Integrity(format!("{} shrank while sending: {e}", out.meta.name))
        })?;
        out.sent += want as u64;
        if out.sent + out.offset == out.meta.size {
            out.state = TransferState::WaitingAck;
        }
        Ok(Some(Frame::Data(buf)))
    }

    /// Feeds one inbound frame to the engine; returns reply frames for
    /// the session to enqueue. M_EOB, M_ERR and M_BSY are session-level
    /// and rejected here.
    pub async fn handle_frame(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        match frame {
            Frame::Data(data) => self.handle_data(&data).await,
            Frame::Command(Command::File, argument) => self.handle_file_announce(&argument).await,
            Frame::Command(Command::Got, argument) => self.handle_got(&argument).await,
            Frame::Command(Command::Skip, argument) => self.handle_skip(&argument).await,
            Frame::Command(Command::Get, argument) => self.handle_get(&argument).await,
            Frame::Command(cmd, _) => Err(Error::Protocol(format!(
                "{cmd} is not a transfer command"
            ))),
        }
    }

    async fn handle_file_announce(&mut self, argument: &str) -> Result<Vec<Frame>> {
        let args = FileArgs::parse(argument, Command::File)?;
        if self.current_in.is_some() {
            return Err(Error::Protocol(format!(
                "M_FILE {} while another file is in progress",
                args.name
            )));
        }
        validate_inbound_name(&args.name)?;
        if self.awaiting_restart.as_deref() == Some(args.name.as_str()) {
            self.awaiting_restart = None;
        }

        let temp_path = self.inbound_dir.join(format!("{}{TEMP_SUFFIX}", args.name));
        let partial = fs::metadata(&temp_path).await.map(|m| m.len()).unwrap_or(0);

        let offset = match args.offset {
            Some(o) if o < 0 => {
                // The peer asks where to start (NR mode).
                if !self.options.nr {
                    return Err(Error::Protocol(
                        "negative offset without NR negotiated".into(),
                    ));
                }
                self.awaiting_restart = Some(args.name.clone());
                return Ok(vec![get_frame(&args, partial)]);
            }
            Some(o) => o as u64,
            None => 0,
        };
        if offset > args.size {
            return Err(Error::Protocol(format!(
                "M_FILE {} offset {offset} beyond size {}",
                args.name, args.size
            )));
        }

        if offset == 0 && partial > 0 && partial < args.size && self.options.nr {
            // We hold a resumable partial; ask for the tail instead.
            self.awaiting_restart = Some(args.name.clone());
            return Ok(vec![get_frame(&args, partial)]);
        }
        if offset != 0 && offset != partial {
            return Err(Error::Protocol(format!(
                "M_FILE {} resumes at {offset} but partial holds {partial} bytes",
                args.name
            )));
        }

        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = if offset > 0 {
            fs::OpenOptions::new()
                .append(true)
                .open(&temp_path)
                .await?
        } else {
            fs::File::create(&temp_path).await?
        };

        let final_path = self.inbound_dir.join(&args.name);
        log::debug!(
            "receiving {} ({} bytes, offset {offset})",
            args.name,
            args.size
        );
        let mut inbound = Inbound {
            name: args.name,
            size: args.size,
            mtime: args.mtime,
            offset,
            received: 0,
            temp_path,
            final_path,
            file,
            expected_crc: args.crc,
            state: TransferState::Receiving,
        };

        if inbound.size == inbound.offset {
            return Ok(vec![self.finish_inbound(inbound).await?]);
        }
        self.current_in = Some(inbound);
        Ok(Vec::new())
    }

    async fn handle_data(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        let Some(inbound) = self.current_in.as_mut() else {
            if self.awaiting_restart.is_some() {
                // Data for a superseded announcement, racing our M_GET.
                return Ok(Vec::new());
            }
            return Err(Error::Protocol("data frame outside a file transfer".into()));
        };
        if inbound.state != TransferState::Receiving {
            return Err(Error::Protocol(format!(
                "data frame for {} in state {:?}",
                inbound.name, inbound.state
            )));
        }

        let remaining = inbound.size - inbound.offset - inbound.received;
        if data.len() as u64 > remaining {
            inbound.state = TransferState::Error;
            return Err(Error::Integrity(format!(
                "{}: {} bytes past the announced size",
                inbound.name,
                data.len() as u64 - remaining
            )));
        }
        inbound.file.write_all(data).await?;
        inbound.received += data.len() as u64;

        if inbound.received == inbound.size - inbound.offset {
            let inbound = self.current_in.take().expect("checked above");
            return Ok(vec![self.finish_inbound(inbound).await?]);
        }
        Ok(Vec::new())
    }

    /// Completes an inbound file: flush, verify, atomic rename, ack.
    async fn finish_inbound(&mut self, mut inbound: Inbound) -> Result<Frame> {
        inbound.file.flush().await?;
        inbound.file.sync_all().await?;
        drop(inbound.file);

        if let Some(expected) = inbound.expected_crc {
            let actual = file_crc32(&inbound.temp_path).await?;
            if actual != expected {
                return Err(Error::Integrity(format!(
                    "{}: file CRC mismatch: got {actual:08x}, expected {expected:08x}",
                    inbound.name
                )));
            }
        }

        let final_path = unique_final_path(&inbound.final_path).await;
        fs::rename(&inbound.temp_path, &final_path).await?;
        inbound.state = TransferState::Completed;
        log::info!(
            "received {} ({} bytes, mtime {}) -> {}",
            inbound.name,
            inbound.size,
            inbound.mtime,
            final_path.display()
        );
        self.received.push(final_path);

        Ok(Frame::command(
            Command::Got,
            format!("{} {}", escape_filename(&inbound.name), inbound.size),
        ))
    }

    async fn handle_got(&mut self, argument: &str) -> Result<Vec<Frame>> {
        let args = FileArgs::parse(argument, Command::Got)?;
        let Some(out) = self.current_out.as_mut() else {
            return Err(Error::Protocol(format!(
                "M_GOT {} with nothing being sent",
                args.name
            )));
        };
        if out.meta.name != args.name {
            return Err(Error::Protocol(format!(
                "M_GOT {} does not match current file {}",
                args.name, out.meta.name
            )));
        }
        out.state = TransferState::Completed;
        let meta = self.current_out.take().expect("checked above").meta;
        if self.delete_sent {
            if let Err(e) = fs::remove_file(&meta.path).await {
                log::warn!("cannot remove sent file {}: {e}", meta.path.display());
            }
        }
        log::info!("peer acknowledged {}", meta.name);
        self.sent.push(meta.path);
        Ok(Vec::new())
    }

    async fn handle_skip(&mut self, argument: &str) -> Result<Vec<Frame>> {
        let args = FileArgs::parse(argument, Command::Skip)?;
        let Some(out) = self.current_out.as_mut() else {
            return Err(Error::Protocol(format!(
                "M_SKIP {} with nothing being sent",
                args.name
            )));
        };
        if out.meta.name != args.name {
            return Err(Error::Protocol(format!(
                "M_SKIP {} does not match current file {}",
                args.name, out.meta.name
            )));
        }
        // Non-destructive: the file stays on disk for a later session.
        let meta = self.current_out.take().expect("checked above").meta;
        log::info!("peer skipped {}", meta.name);
        self.skipped.push(meta.path);
        Ok(Vec::new())
    }

    async fn handle_get(&mut self, argument: &str) -> Result<Vec<Frame>> {
        let args = FileArgs::parse(argument, Command::Get)?;
        let offset = match args.offset {
            Some(o) if o >= 0 => o as u64,
            _ => {
                return Err(Error::Protocol(format!(
                    "M_GET {} without a usable offset",
                    args.name
                )))
            }
        };
        let Some(out) = self.current_out.as_mut() else {
            return Err(Error::Protocol(format!(
                "M_GET {} with nothing being sent",
                args.name
            )));
        };
        if out.meta.name != args.name {
            return Err(Error::Protocol(format!(
                "M_GET {} does not match current file {}",
                args.name, out.meta.name
            )));
        }
        if offset > out.meta.size {
            return Err(Error::Protocol(format!(
                "M_GET {} offset {offset} beyond size {}",
                args.name, out.meta.size
            )));
        }
        log::debug!("peer requests {} from offset {offset}", out.meta.name);
        out.restart_at = Some(offset);
        Ok(Vec::new())
    }
}

fn get_frame(args: &FileArgs, offset: u64) -> Frame {
    Frame::command(
        Command::Get,
        format!(
            "{} {} {} {offset}",
            escape_filename(&args.name),
            args.size,
            args.mtime
        ),
    )
}

/// Rejects names that could escape the inbound directory.
fn validate_inbound_name(name: &str) -> Result<()> {
    let hostile = name.is_empty()
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if hostile {
        return Err(Error::Protocol(format!("unsafe file name {name:?}")));
    }
    Ok(())
}

/// Picks a non-clobbering final path by appending a numeric suffix.
async fn unique_final_path(wanted: &Path) -> PathBuf {
    if fs::metadata(wanted).await.is_err() {
        return wanted.to_path_buf();
    }
    for n in 0.. {
        let candidate = wanted.with_extension(format!(
            "{}.{n}",
            wanted.extension().and_then(|e| e.to_str()).unwrap_or("dup")
        ));
        if fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
    }
    unreachable!("suffix space exhausted")
}

/// CRC32 of a whole file, streamed.
pub async fn file_crc32(path: &Path) -> Result<u32> {
    let mut file = fs::File::open(path).await?;
    let mut digest = crate::crc32::Crc32Accumulator::new();
    let mut buf = vec![0u8; FILE_BUF];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finalize())
}
