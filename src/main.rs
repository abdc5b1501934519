use crate::cli::Commands;
use crate::error::Result;
use clap::Parser;
use std::io::Write;

mod assistant;
mod chat;
mod cli;
mod error;
mod logging;
mod progress;
mod query;
mod scrape;
mod systems;
mod tower;
mod watsonx;

fn build_assistant(config: cli::PipelineConfig) -> Result<assistant::Assistant> {
    let generator = watsonx::WatsonxClient::new(config.watsonx)?;
    assistant::Assistant::new(config.tower, Box::new(generator), config.output_path)
}

async fn run_chat(args: cli::ChatArgs) -> Result<()> {
    let (config, systems_csv) = args.prepare()?;
    let assistant = build_assistant(config)?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    chat::run(&assistant, &systems_csv, &mut stdin.lock(), &mut stdout.lock()).await?;
    Ok(())
}

async fn run_query(args: cli::QueryArgs) -> Result<()> {
    let (config, query) = args.prepare()?;
    let assistant = build_assistant(config)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "Querying the information, this may take a few moments...")?;
    assistant.answer(&query, &mut stdout).await?;
    Ok(())
}

async fn run_prompt(args: cli::PromptArgs) -> Result<()> {
    let (config, prompts) = args.prepare()?;
    let client = watsonx::WatsonxClient::new(config)?;
    for response in watsonx::generate_all(&client, &prompts).await? {
        println!("{}", response);
    }
    Ok(())
}

fn list_systems(args: cli::SystemsArgs) -> Result<()> {
    let table = systems::SystemTable::load(&args.systems_csv)?;
    for row in table.rows() {
        println!("{}", systems::describe(row));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Settings may come from a .env file in the working directory
    let _ = dotenvy::dotenv();
    let args = cli::Cli::parse();
    logging::init(args.verbose, args.quiet);

    let result = match args.command {
        Commands::Chat(chat) => run_chat(chat).await,
        Commands::Query(query) => run_query(query).await,
        Commands::Prompt(prompt) => run_prompt(prompt).await,
        Commands::Systems(systems) => list_systems(systems),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    tracing::debug!("{}", progress::Counters::snapshot().status_line());
}
