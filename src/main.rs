//! binding-lifecycle CLI
//!
//! Runs lifecycle steps against one service binding fixture, in order, stopping
//! at the first failure.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use binding_lifecycle::probe::AutosleepProbe;
use binding_lifecycle::{LifecycleConfig, LifecycleController};

/// Drive a service broker, instance and binding fixture on Cloud Foundry
#[derive(Parser, Debug)]
#[command(name = "binding-lifecycle", version, about, long_about = None)]
struct Cli {
    /// Fixture configuration file (YAML)
    #[arg(short, long, env = "BINDING_LIFECYCLE_CONFIG")]
    config: PathBuf,

    /// Platform username, overrides the configuration file
    #[arg(long, env = "CF_USERNAME")]
    username: Option<String>,

    /// Platform password, overrides the configuration file
    #[arg(long, env = "CF_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Instance parameters as a JSON object, used by create-instance and update-instance
    #[arg(long)]
    params: Option<String>,

    /// Path requested by the ping step
    #[arg(long, default_value = "/")]
    path: String,

    /// Steps to run, in order
    #[arg(value_enum, required = true)]
    steps: Vec<Step>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Step {
    Clean,
    CreateBroker,
    DeleteBroker,
    PublishBroker,
    UnpublishBroker,
    CreateInstance,
    UpdateInstance,
    DeleteInstance,
    Bind,
    Unbind,
    ShouldBeBound,
    ShouldNotBeBound,
    BoundApps,
    Start,
    Stop,
    ShouldBeStarted,
    ShouldBeStopped,
    Ping,
    AutosleepForgotApp,
}

impl Cli {
    fn parameters(&self) -> anyhow::Result<Option<serde_json::Value>> {
        self.params
            .as_deref()
            .map(|raw| serde_json::from_str(raw).context("--params is not valid JSON"))
            .transpose()
    }

    async fn run(self) -> anyhow::Result<()> {
        let config = LifecycleConfig::load(&self.config)?
            .with_credentials(self.username.clone(), self.password.clone());
        let parameters = self.parameters()?;

        let mut controller = LifecycleController::connect(&config).await?;

        for step in &self.steps {
            info!(step = ?step, "Running step");
            match step {
                Step::Clean => controller.clean_all_service_data().await?,
                Step::CreateBroker => controller.create_service_broker().await?,
                Step::DeleteBroker => controller.delete_service_broker().await?,
                Step::PublishBroker => controller.ensure_broker_published().await?,
                Step::UnpublishBroker => controller.ensure_broker_unpublished().await?,
                Step::CreateInstance => {
                    controller.create_service_instance(parameters.clone()).await?
                }
                Step::UpdateInstance => {
                    let Some(parameters) = parameters.clone() else {
                        bail!("update-instance requires --params");
                    };
                    controller.update_service_instance(parameters).await?
                }
                Step::DeleteInstance => controller.delete_service_instance().await?,
                Step::Bind => controller.bind_application().await?,
                Step::Unbind => controller.unbind_application().await?,
                Step::ShouldBeBound => controller.should_be_bound().await?,
                Step::ShouldNotBeBound => controller.should_not_be_bound().await?,
                Step::BoundApps => {
                    for app in controller.get_bound_applications().await? {
                        println!("{}", app);
                    }
                }
                Step::Start => controller.start_application().await?,
                Step::Stop => controller.stop_application().await?,
                Step::ShouldBeStarted => controller.should_be_started().await?,
                Step::ShouldBeStopped => controller.should_be_stopped().await?,
                Step::Ping => controller.ping_application(&self.path).await?,
                Step::AutosleepForgotApp => {
                    let Some(autosleep) = config.autosleep.clone() else {
                        bail!("autosleep-forgot-app requires an `autosleep` configuration section");
                    };
                    AutosleepProbe::new(autosleep, controller.application().name.clone())?
                        .should_not_know_application()
                        .await?
                }
            }
        }

        info!(steps = self.steps.len(), "All steps passed");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    Cli::parse().run().await
}
