use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live MIDI routing engine", long_about = None)]
pub struct Args {
    /// List available MIDI devices
    #[arg(long)]
    pub device_list: bool,

    /// Configuration file (TOML); default is !/pigpen.toml
    #[arg(long)]
    pub config: Option<String>,

    /// Run a batch script after startup
    #[arg(long)]
    pub batch: Option<String>,

    /// Exit after startup and any batch script instead of reading commands
    #[arg(long)]
    pub no_repl: bool,
}
