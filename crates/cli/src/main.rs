use clap::Parser;
use rtsp_vod::{Server, ServerConfig};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "rtsp-vod-server",
    about = "Video-on-demand RTSP server for looping MJPEG frame files"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// Directory scanned for media files
    #[arg(long, short, default_value = ".")]
    media_dir: PathBuf,

    /// Media file extension, repeatable (case-insensitive)
    #[arg(long = "extension", short, default_value = "mjpeg")]
    extensions: Vec<String>,

    /// Milliseconds between data packets of one session
    #[arg(long, default_value_t = 40)]
    frame_interval_ms: u64,

    /// Payload type written into data packet headers
    #[arg(long, default_value_t = 26)]
    payload_type: u8,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ServerConfig {
        media_dir: args.media_dir,
        extensions: args.extensions,
        frame_interval: Duration::from_millis(args.frame_interval_ms),
        payload_type: args.payload_type,
    };
    let mut server = Server::with_config(&args.bind, config);

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return;
    }

    if let Some(catalog) = server.catalog() {
        for name in catalog.names() {
            println!("  {}", name);
        }
    }
    println!("RTSP server on {}, press Enter to stop", args.bind);
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        eprintln!("Failed to read stdin: {}", e);
    }

    server.stop();
}
