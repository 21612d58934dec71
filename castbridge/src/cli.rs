use clap::Parser;

/// Exposes a cast device as a DLNA/UPnP MediaRenderer.
#[derive(Parser, Debug, Clone)]
#[command(name = "castbridge", version)]
pub struct Cli {
    /// Detach from the terminal and run in the background.
    #[arg(short = 'd', long = "daemon")]
    pub daemon: bool,

    /// Name (or part of the name) of the cast device to drive.
    #[arg(short = 'c', long = "chromecast", value_name = "NAME")]
    pub chromecast: String,

    /// Name shown to controllers, defaults to `castbridge "<NAME>" (<host>)`.
    #[arg(short = 'n', long = "display-name", value_name = "NAME")]
    pub display_name: Option<String>,

    /// Address or interface name the servers bind to.
    #[arg(short = 'i', long = "interface", value_name = "ADDR")]
    pub interface: Option<String>,

    /// Transcode video sources to audio-only MP3 before handing them to the device.
    #[arg(short = 'a', long = "audio-only")]
    pub audio_only: bool,

    /// Configuration directory.
    #[arg(long = "config", value_name = "DIR")]
    pub config: Option<String>,

    /// URLs to play in order before exiting.
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,
}
