use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::assistant::DEFAULT_OUTPUT_FILE;
use crate::error::{ChatError, Result};
use crate::query::{EntityType, RacfQuery};
use crate::systems::DEFAULT_SYSTEMS_CSV;
use crate::tower::{
    TowerConfig, DEFAULT_JOB_TEMPLATE_ID, DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY,
};
use crate::watsonx::{DecodingMethod, GenerationParams, WatsonxConfig, DEFAULT_IAM_URL, DEFAULT_MODEL};

/// Answers questions about z/OS RACF users and groups by running an Ansible Tower
/// job and summarizing its output with watsonx.ai.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Only log errors
    #[arg(long, short, global = true, action)]
    pub quiet: bool,

    /// Log debug detail, including prompts and poll counts
    #[arg(long, short, global = true, action)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive chatbot; type 'exit' to leave
    Chat(ChatArgs),
    /// Run a single lookup for a known host and exit
    Query(QueryArgs),
    /// Send prompts straight to the model and print the completions
    Prompt(PromptArgs),
    /// List every system in the systems table
    Systems(SystemsArgs),
}

#[derive(Args, Debug)]
pub struct WatsonxArgs {
    /// IBM Cloud API key
    #[arg(long, env = "API_KEY", hide_env_values = true, value_parser)]
    api_key: Option<String>,

    /// watsonx.ai endpoint, e.g. https://us-south.ml.cloud.ibm.com
    #[arg(long, env = "IBM_CLOUD_URL", value_parser)]
    ibm_cloud_url: Option<String>,

    /// watsonx.ai project id
    #[arg(long, env = "PROJECT_ID", value_parser)]
    project_id: Option<String>,

    /// IAM endpoint the API key is exchanged at
    #[arg(long, env = "IBM_IAM_URL", default_value = DEFAULT_IAM_URL, value_parser)]
    iam_url: String,

    #[arg(long, default_value = DEFAULT_MODEL, value_parser)]
    model_id: String,

    #[arg(long, value_enum, default_value_t = DecodingMethod::Greedy)]
    decoding_method: DecodingMethod,

    #[arg(long, default_value_t = 100, value_parser)]
    max_new_tokens: u32,

    #[arg(long, default_value_t = 30, value_parser)]
    min_new_tokens: u32,

    #[arg(long, default_value_t = 42, value_parser)]
    random_seed: u64,

    #[arg(long, default_value_t = 1.0, value_parser)]
    temperature: f64,

    #[arg(long, default_value_t = 1.0, value_parser)]
    repetition_penalty: f64,
}

#[derive(Args, Debug)]
pub struct TowerArgs {
    /// Ansible Tower / AWX base URL
    #[arg(long, env = "ANSIBLE_TOWER_URL", value_parser)]
    tower_url: Option<String>,

    /// Ansible Tower OAuth2 token
    #[arg(long, env = "ANSIBLE_TOWER_TOKEN", hide_env_values = true, value_parser)]
    tower_token: Option<String>,

    /// Job template that runs the RACF playbook
    #[arg(long, env = "ANSIBLE_JOB_TEMPLATE_ID", default_value_t = DEFAULT_JOB_TEMPLATE_ID, value_parser)]
    job_template_id: u64,

    /// Verify the tower's TLS certificate (off by default)
    #[arg(long, env = "ANSIBLE_TOWER_VERIFY_TLS", action)]
    verify_tls: bool,

    /// Seconds between job status checks
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs(), value_parser)]
    poll_interval_secs: u64,

    /// Seconds to wait after the job finishes before reading its output
    #[arg(long, default_value_t = DEFAULT_SETTLE_DELAY.as_secs(), value_parser)]
    settle_delay_secs: u64,

    /// Give up waiting for the job after this many seconds (default: wait forever)
    #[arg(long, value_parser)]
    poll_timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub struct PipelineArgs {
    #[command(flatten)]
    watsonx: WatsonxArgs,

    #[command(flatten)]
    tower: TowerArgs,

    /// Where the cleaned RACF output is written (overwritten on every query)
    #[arg(long, default_value = DEFAULT_OUTPUT_FILE, value_parser)]
    output: PathBuf,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// CSV table with at least 'system' and 'host' columns
    #[arg(long, env = "SYSTEMS_CSV", default_value = DEFAULT_SYSTEMS_CSV, value_parser)]
    systems_csv: PathBuf,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// z/OS host the playbook runs against
    #[arg(long, value_parser)]
    host: String,

    #[arg(long, value_enum)]
    entity_type: EntityType,

    /// RACF user id or group name
    #[arg(long, value_parser)]
    entity_name: String,
}

#[derive(Args, Debug)]
pub struct PromptArgs {
    #[command(flatten)]
    watsonx: WatsonxArgs,

    #[arg(required = true, value_parser)]
    prompts: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SystemsArgs {
    #[arg(long, env = "SYSTEMS_CSV", default_value = DEFAULT_SYSTEMS_CSV, value_parser)]
    pub systems_csv: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub watsonx: WatsonxConfig,
    pub tower: TowerConfig,
    pub output_path: PathBuf,
}

fn required(value: Option<String>, var: &'static str, missing: &mut Vec<&'static str>) -> String {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => v,
        None => {
            missing.push(var);
            String::new()
        }
    }
}

fn check_missing(missing: Vec<&'static str>) -> Result<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ChatError::MissingSettings(missing.join(", ")))
    }
}

impl WatsonxArgs {
    fn resolve(self, missing: &mut Vec<&'static str>) -> WatsonxConfig {
        WatsonxConfig {
            api_key: required(self.api_key, "API_KEY", missing),
            url: required(self.ibm_cloud_url, "IBM_CLOUD_URL", missing),
            project_id: required(self.project_id, "PROJECT_ID", missing),
            iam_url: self.iam_url,
            model_id: self.model_id,
            params: GenerationParams {
                decoding_method: self.decoding_method,
                max_new_tokens: self.max_new_tokens,
                min_new_tokens: self.min_new_tokens,
                random_seed: self.random_seed,
                temperature: self.temperature,
                repetition_penalty: self.repetition_penalty,
            },
        }
    }

    pub fn prepare(self) -> Result<WatsonxConfig> {
        let mut missing = Vec::new();
        let config = self.resolve(&mut missing);
        check_missing(missing)?;
        Ok(config)
    }
}

impl TowerArgs {
    fn resolve(self, missing: &mut Vec<&'static str>) -> TowerConfig {
        TowerConfig {
            url: required(self.tower_url, "ANSIBLE_TOWER_URL", missing),
            token: required(self.tower_token, "ANSIBLE_TOWER_TOKEN", missing),
            job_template_id: self.job_template_id,
            verify_tls: self.verify_tls,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            poll_timeout: self.poll_timeout_secs.map(Duration::from_secs),
        }
    }
}

impl PipelineArgs {
    pub fn prepare(self) -> Result<PipelineConfig> {
        let mut missing = Vec::new();
        let watsonx = self.watsonx.resolve(&mut missing);
        let tower = self.tower.resolve(&mut missing);
        check_missing(missing)?;

        let output_path = if self.output.is_absolute() {
            self.output
        } else {
            env::current_dir()?.join(self.output)
        };

        tracing::debug!(
            "Configuration: {:#?}",
            PipelineConfig {
                watsonx: WatsonxConfig {
                    api_key: "[REDACTED]".to_string(),
                    ..watsonx.clone()
                },
                tower: TowerConfig {
                    token: "[REDACTED]".to_string(),
                    ..tower.clone()
                },
                output_path: output_path.clone(),
            }
        );
        Ok(PipelineConfig {
            watsonx,
            tower,
            output_path,
        })
    }
}

impl ChatArgs {
    pub fn prepare(self) -> Result<(PipelineConfig, PathBuf)> {
        Ok((self.pipeline.prepare()?, self.systems_csv))
    }
}

impl QueryArgs {
    pub fn prepare(self) -> Result<(PipelineConfig, RacfQuery)> {
        let query = RacfQuery {
            host: self.host,
            entity_type: self.entity_type,
            entity_name: self.entity_name,
        };
        Ok((self.pipeline.prepare()?, query))
    }
}

impl PromptArgs {
    pub fn prepare(self) -> Result<(WatsonxConfig, Vec<String>)> {
        Ok((self.watsonx.prepare()?, self.prompts))
    }
}
