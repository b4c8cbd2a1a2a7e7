use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pipesh", version, about = "A small shell with concurrent pipelines")]
pub struct Cli {
    /// Run one command line and exit with its status
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    pub command: Option<String>,

    /// Prompt shown before each line when reading from a terminal
    #[arg(long, env = "PIPESH_PROMPT", default_value = "pipesh$ ")]
    pub prompt: String,
}
