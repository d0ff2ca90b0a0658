use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "mmcode")]
#[command(about = "Terminal coding agent for the MiniMax coding-plan API", long_about = None)]
#[command(version)]
pub struct Args {
    #[arg(long = "model", help = "Override the session model id")]
    pub model: Option<String>,

    #[arg(long = "plan", help = "Start in PLAN mode (read-only tools)")]
    pub plan: bool,

    #[arg(long = "theme", help = "Color theme name")]
    pub theme: Option<String>,
}
