use clap::Parser;
use std::io::Read;

use rivulet::shell::{Engine, EngineOptions};

#[derive(Parser)]
#[command(name = "rivulet")]
#[command(about = "An interactive shell language evaluator")]
#[command(version)]
struct Cli {
    /// Execute the script from a command-line argument
    #[arg(short = 'c')]
    script: Option<String>,

    /// Output {value, stdout, stderr, exitCode} as JSON instead of raw text
    #[arg(long = "json")]
    json: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let script = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("Error: cannot read script file: {file}: {e}");
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("Error: no script provided. Use -c 'script', a script file, or pipe via stdin.");
            std::process::exit(1);
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
        buf
    };

    if script.trim().is_empty() {
        if cli.json {
            println!("{}", serde_json::json!({"values": [], "stdout": "", "stderr": "", "exitCode": 0}));
        }
        std::process::exit(0);
    }

    let engine = Engine::new(EngineOptions::default());
    let result = engine.exec(&script).await;

    if cli.json {
        let values: Vec<String> = result.values.iter().map(|v| v.display_text()).collect();
        println!(
            "{}",
            serde_json::json!({
                "values": values,
                "stdout": result.stdout,
                "stderr": result.stderr,
                "exitCode": result.exit_code,
            })
        );
    } else {
        if !result.stdout.is_empty() {
            print!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
    }

    std::process::exit(result.exit_code);
}
