use std::{fmt::Display, time::Duration};

use anyhow::{anyhow, bail, Result};
use clap::{Args, ValueEnum};

use crate::{daemon::capture::screenshot::ScreenshotCommand, model::openai::ProviderEndpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    OpenAi,
    Azure,
}

impl Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "open-ai"),
            Provider::Azure => write!(f, "azure"),
        }
    }
}

/// Tracker options. Each one can also be set through the environment or a `.env` file.
#[derive(Args, Debug, Clone)]
pub struct TrackerArgs {
    /// Seconds between two samples.
    #[arg(long, env = "TRACKING_INTERVAL_SECONDS", default_value_t = 120)]
    pub interval: u64,
    /// Seconds a single model call may take.
    #[arg(long = "model-timeout", env = "MODEL_TIMEOUT_SECONDS", default_value_t = 60)]
    pub model_timeout: u64,
    #[arg(long, env = "MODEL_PROVIDER", value_enum, default_value_t = Provider::OpenAi)]
    pub provider: Provider,

    #[arg(long = "api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(long = "base-url", env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub base_url: String,
    /// Model that looks at screenshots.
    #[arg(long = "vision-model", env = "OPENAI_VISION_MODEL", default_value = "gpt-4o-mini")]
    pub vision_model: String,
    /// Model that merges topics.
    #[arg(long = "text-model", env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub text_model: String,

    #[arg(long = "azure-endpoint", env = "AZURE_OPENAI_ENDPOINT")]
    pub azure_endpoint: Option<String>,
    #[arg(long = "azure-api-key", env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
    pub azure_api_key: Option<String>,
    #[arg(long = "azure-deployment", env = "AZURE_OPENAI_DEPLOYMENT")]
    pub azure_deployment: Option<String>,
    #[arg(long = "azure-api-version", env = "AZURE_OPENAI_API_VERSION")]
    pub azure_api_version: Option<String>,

    /// How many known topics the classifier is shown at most.
    #[arg(long = "topic-candidates", env = "TOPIC_CANDIDATE_LIMIT", default_value_t = 50)]
    pub topic_candidates: usize,
    /// Command writing a PNG of the desktop. `{path}` is replaced with the target file.
    #[arg(
        long = "screenshot-command",
        env = "SCREENSHOT_COMMAND",
        default_value = "import -window root {path}"
    )]
    pub screenshot_command: String,
}

impl TrackerArgs {
    /// Arguments that reproduce these options on another command line.
    pub fn to_command_line(&self) -> Vec<String> {
        let mut args = vec![
            "--interval".into(),
            self.interval.to_string(),
            "--model-timeout".into(),
            self.model_timeout.to_string(),
            "--provider".into(),
            self.provider.to_string(),
            "--base-url".into(),
            self.base_url.clone(),
            "--vision-model".into(),
            self.vision_model.clone(),
            "--text-model".into(),
            self.text_model.clone(),
            "--topic-candidates".into(),
            self.topic_candidates.to_string(),
            "--screenshot-command".into(),
            self.screenshot_command.clone(),
        ];
        // Secrets are left to the environment so they don't show up in process listings.
        for (flag, value) in [
            ("--azure-endpoint", &self.azure_endpoint),
            ("--azure-deployment", &self.azure_deployment),
            ("--azure-api-version", &self.azure_api_version),
        ] {
            if let Some(value) = value {
                args.push(flag.into());
                args.push(value.clone());
            }
        }
        args
    }
}

/// Validated tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub interval: Duration,
    pub model_timeout: Duration,
    pub endpoint: ProviderEndpoint,
    pub vision_model: String,
    pub text_model: String,
    pub topic_candidates: usize,
    pub screenshot_command: ScreenshotCommand,
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{name} is required for the selected model provider"))
}

impl TryFrom<TrackerArgs> for TrackerConfig {
    type Error = anyhow::Error;

    fn try_from(args: TrackerArgs) -> Result<Self> {
        if args.interval == 0 {
            bail!("Tracking interval must be at least one second");
        }
        if args.model_timeout == 0 {
            bail!("Model timeout must be at least one second");
        }
        if args.topic_candidates == 0 {
            bail!("Topic candidate limit must be positive");
        }

        let (endpoint, vision_model, text_model) = match args.provider {
            Provider::OpenAi => (
                ProviderEndpoint::OpenAi {
                    base_url: args.base_url,
                    api_key: required(args.api_key, "OPENAI_API_KEY")?,
                },
                args.vision_model,
                args.text_model,
            ),
            Provider::Azure => {
                let deployment = required(args.azure_deployment, "AZURE_OPENAI_DEPLOYMENT")?;
                (
                    ProviderEndpoint::Azure {
                        endpoint: required(args.azure_endpoint, "AZURE_OPENAI_ENDPOINT")?,
                        api_key: required(args.azure_api_key, "AZURE_OPENAI_API_KEY")?,
                        deployment: deployment.clone(),
                        api_version: required(args.azure_api_version, "AZURE_OPENAI_API_VERSION")?,
                    },
                    // Azure routes by deployment, the model name is informational.
                    deployment.clone(),
                    deployment,
                )
            }
        };

        Ok(Self {
            interval: Duration::from_secs(args.interval),
            model_timeout: Duration::from_secs(args.model_timeout),
            endpoint,
            vision_model,
            text_model,
            topic_candidates: args.topic_candidates,
            screenshot_command: args.screenshot_command.parse()?,
        })
    }
}
