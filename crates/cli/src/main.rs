use anyhow::Context;
use clap::Parser;

use bloodbank_auth::Role;
use bloodbank_cli::{Cli, Command, OperatorContext, Report, UserCommand};
use bloodbank_infra::StoreConfig;
use bloodbank_infra::store::{PostgresDonorDirectory, PostgresLedger, PostgresUserDirectory, schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bloodbank_observability::init();
    let cli = Cli::parse();

    let config = StoreConfig::from_env().context("loading store configuration")?;
    let pool = config.connect().await?;

    match cli.command {
        Command::Migrate => {
            schema::migrate(&pool).await.context("running schema migration")?;
            println!("schema up to date");
        }
        Command::User(UserCommand::Add { username, role }) => {
            let users = PostgresUserDirectory::new(pool);
            let actor = users.upsert(&username, &Role::new(role)).await?;
            println!("user {} (#{}) has role {}", actor.username, actor.user_id, actor.role);
        }
        Command::Operation(operation) => {
            let ctx = OperatorContext::new(
                PostgresLedger::new(pool.clone()),
                PostgresDonorDirectory::new(pool.clone()),
                PostgresUserDirectory::new(pool),
            );
            let report = ctx.run(cli.user.as_deref(), operation).await?;
            print_report(&report, cli.json)?;
            if !report.outcome.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_report(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    match report.outcome.kind {
        Some(kind) => eprintln!("error [{kind}]: {}", report.outcome.message),
        None => println!("{}", report.outcome.message),
    }
    if let Some(data) = &report.data {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}
