use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kiro-server",
    about = "Kiro Gateway - Anthropic and OpenAI compatible front for Kiro credentials",
    version = env!("CARGO_PKG_VERSION"),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the gateway (default if no command specified)")]
    Serve(ServeArgs),

    #[command(about = "Validate settings and credentials, then exit")]
    CheckConfig(FileArgs),
}

#[derive(Args, Clone, Debug, Default)]
pub struct FileArgs {
    #[arg(short, long, env = "KIRO_CONFIG", help = "Settings file (default ~/.kiro-gateway/settings.json)")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "KIRO_CREDENTIALS_FILE", help = "Credentials file (default ~/.kiro-gateway/credentials.json)")]
    pub credentials: Option<PathBuf>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct ServeArgs {
    #[arg(short, long, env = "PORT", help = "Listen port, overrides the settings file")]
    pub port: Option<u16>,

    #[arg(long, env = "HOST", help = "Listen address, overrides the settings file")]
    pub host: Option<String>,

    #[command(flatten)]
    pub files: FileArgs,
}
