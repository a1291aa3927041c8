use clap::{CommandFactory, Parser};
use lazybox::{
    cli::{AnsiStyles, LazyboxArgs, LazyboxSubcommand},
    config::LazyboxConfig,
    lifecycle::{LifecycleController, ProvisionInput},
    management::{self, Collaborators},
    models::SandboxRecord,
    utils, LazyboxResult,
};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> LazyboxResult<()> {
    utils::load_dotenv();

    let args = LazyboxArgs::parse();

    // RUST_LOG wins over the verbosity flag
    let default_level = if args.verbose { "debug" } else { "info" };
    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let Some(subcommand) = args.subcommand else {
        LazyboxArgs::command().print_help()?;
        return Ok(());
    };

    let config_path = utils::resolve_config_path(args.config);
    let config = LazyboxConfig::load(&config_path).await?;

    match subcommand {
        LazyboxSubcommand::Serve { ephemeral } => {
            let collaborators = if ephemeral {
                tracing::warn!("running with in-memory collaborators, state is lost on exit");
                Collaborators::ephemeral()
            } else {
                Collaborators::connect(&config).await?
            };
            management::serve(&config, collaborators).await?;
        }
        LazyboxSubcommand::Provision {
            repository,
            user,
            pr,
            created_by_user_id,
        } => {
            tracing::trace!("provisioning: repository={repository}, user={user}, pr={pr}");
            let controller = controller(&config).await?;
            let input = ProvisionInput::builder()
                .repository(repository)
                .user(user)
                .pr(pr)
                .created_by_user_id(created_by_user_id)
                .build();
            print_json(&controller.provision(&input).await?)?;
        }
        LazyboxSubcommand::Start { uuid } => {
            let next_check_at = controller(&config).await?.start_or_restart(&uuid).await?;
            println!("{} started, idle-check at {next_check_at}", uuid.to_string().literal());
        }
        LazyboxSubcommand::IdleCheck { uuid, force } => {
            let outcome = controller(&config).await?.idle_check(&uuid, force).await?;
            print_json(&outcome)?;
        }
        LazyboxSubcommand::List => {
            print_table(&controller(&config).await?.sandboxes().await?);
        }
        LazyboxSubcommand::Show { uuid } => {
            print_json(&controller(&config).await?.sandbox(&uuid).await?)?;
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn controller(config: &LazyboxConfig) -> LazyboxResult<LifecycleController> {
    Ok(Collaborators::connect(config).await?.controller(config))
}

fn print_json(value: &impl Serialize) -> LazyboxResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_table(records: &[SandboxRecord]) {
    println!(
        "{}",
        format!("{:<36}  {:<8}  {:<7}  {}", "UUID", "STATUS", "DESIRED", "DOMAIN").header()
    );

    for record in records {
        let desired = record
            .desired_tasks
            .map(|count| count.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36}  {:<8}  {:<7}  {}",
            record.uuid,
            record.status,
            desired,
            record.domain.placeholder()
        );
    }
}
