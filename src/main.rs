// Main entry point for the application

use clap::{Parser, Subcommand};
use chunkrelay::chunking::SenderJob;
use chunkrelay::common::types::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_IN_FLIGHT};
use chunkrelay::transport::{TcpMessageListener, TcpSender};
use chunkrelay::{
    CompletedFile, DataSender, Error, FileReceiver, ProgressSink, ReassemblyTable,
    TransferConfig, TransportConfig, WireFormat,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const BAR_TEMPLATE: &str = "{msg:30} [{bar:40.cyan/blue}] {percent:>3}%";

#[derive(Parser)]
#[command(name = "chunkrelay")]
#[command(about = "Send files as chunked messages and reassemble them on the other side", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file to a listening peer
    Send {
        /// File to send
        file: PathBuf,

        /// Peer address
        #[arg(long, default_value = "127.0.0.1:4455")]
        to: SocketAddr,

        /// Room/session id stamped on every chunk
        #[arg(long)]
        room: Option<String>,

        /// Chunk payload size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Wire format: binary or json
        #[arg(long, default_value = "binary")]
        format: WireFormat,

        /// Override the guessed MIME type
        #[arg(long)]
        mime: Option<String>,
    },

    /// Listen for peers and save the files they send
    Recv {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:4455")]
        bind: SocketAddr,

        /// Directory completed files are written to
        #[arg(long, default_value = "./received")]
        out: PathBuf,

        /// Maximum transfers reassembling at once
        #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
        max_in_flight: usize,

        /// Exit after the first connection closes
        #[arg(long)]
        once: bool,
    },
}

/// Progress sink that draws one bar per file
struct BarSink {
    bars: MultiProgress,
    active: HashMap<String, ProgressBar>,
    labels: HashMap<String, String>,
}

impl BarSink {
    fn new(bars: MultiProgress) -> Self {
        Self {
            bars,
            active: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    fn label(mut self, file_id: &str, label: &str) -> Self {
        self.labels.insert(file_id.to_string(), label.to_string());
        self
    }

    fn bar(&mut self, file_id: &str) -> &ProgressBar {
        let label = self
            .labels
            .get(file_id)
            .cloned()
            .unwrap_or_else(|| file_id.to_string());
        let bars = &self.bars;
        self.active.entry(file_id.to_string()).or_insert_with(|| {
            let bar = bars.add(ProgressBar::new(1000));
            if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                bar.set_style(style.progress_chars("=> "));
            }
            bar.set_message(label);
            bar
        })
    }
}

impl ProgressSink for BarSink {
    fn on_progress(&mut self, file_id: &str, fraction: f64) {
        self.bar(file_id).set_position((fraction * 1000.0) as u64);
    }

    fn on_completed(&mut self, file: &CompletedFile) {
        if let Some(bar) = self.active.remove(&file.file_id) {
            bar.finish_with_message(format!("{} ({} bytes)", file.name, file.len()));
        }
    }

    fn on_failed(&mut self, file_id: &str, error: &Error) {
        if let Some(bar) = self.active.remove(file_id) {
            bar.abandon_with_message(format!("failed: {}", error));
        }
    }
}

fn run_send(
    file: PathBuf,
    to: SocketAddr,
    room: Option<String>,
    chunk_size: usize,
    format: WireFormat,
    mime: Option<String>,
) -> Result<()> {
    let config = TransferConfig::new()
        .with_chunk_size(chunk_size)?
        .with_wire_format(format);
    let mut transport_config = TransportConfig::new(to);
    if let Some(room) = room {
        transport_config = transport_config.with_room(room)?;
    }

    let mime = mime.unwrap_or_else(|| {
        mime_guess::from_path(&file)
            .first_or_octet_stream()
            .to_string()
    });
    let job = SenderJob::from_path(&file, mime, config.chunk_size)?;

    println!("File to send:");
    println!("  Path: {:?}", file);
    println!("  Size: {} bytes", job.source_len());
    println!("  Chunks: {} x {} bytes ({:?})", job.total_chunks(), job.chunk_size(), format);
    println!("  File ID: {}", job.file_id());

    let mut transport = TcpSender::connect(&transport_config)?;
    let mut sender = DataSender::new(&config).with_session(transport_config.room.clone());
    let mut sink = BarSink::new(MultiProgress::new()).label(job.file_id(), job.name());

    let report = sender.send_job(job, &mut transport, &mut sink)?;
    transport.finish()?;
    if let Some(bar) = sink.active.remove(&report.file_id) {
        bar.finish();
    }

    println!(
        "\n✅ Sent {} chunks ({} bytes) to {}",
        report.chunks_sent, report.bytes_sent, to
    );
    Ok(())
}

fn run_recv(bind: SocketAddr, out: PathBuf, max_in_flight: usize, once: bool) -> Result<()> {
    let config = TransferConfig::new()
        .with_max_in_flight(max_in_flight)?
        .with_output_dir(out);
    std::fs::create_dir_all(&config.output_dir)?;

    let listener = TcpMessageListener::bind(&TransportConfig::new(bind))?;
    let table = Arc::new(ReassemblyTable::from_config(&config));
    let bars = MultiProgress::new();

    println!("Receiving on {}", listener.local_addr()?);
    println!("  Output directory: {:?}", config.output_dir);
    println!("  Max in-flight transfers: {}", config.max_in_flight);
    println!("Press Ctrl+C to stop\n");

    loop {
        let reader = listener.accept()?;
        let peer = reader.peer();
        let mut receiver = FileReceiver::new(Arc::clone(&table)).with_output_dir(&config.output_dir);
        let mut sink = BarSink::new(bars.clone());

        let handle = std::thread::spawn(move || {
            for message in reader {
                match message {
                    Ok(raw) => {
                        receiver.on_inbound_message(&raw, &mut sink);
                    }
                    Err(e) => {
                        log::warn!("Connection from {} ended: {}", peer, e);
                        break;
                    }
                }
            }
            log::info!("{} disconnected: {:?}", peer, receiver.stats());
        });

        if once {
            if handle.join().is_err() {
                log::error!("Receiver thread for {} panicked", peer);
            }
            return Ok(());
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Send { file, to, room, chunk_size, format, mime } => {
            run_send(file, to, room, chunk_size, format, mime)
        }
        Commands::Recv { bind, out, max_in_flight, once } => {
            run_recv(bind, out, max_in_flight, once)
        }
    }
}
