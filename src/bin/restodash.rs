use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use restodash::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "restodash", version, about = "Restodash admin dashboard client")]
struct Cli {
    /// Directory holding the persisted session
    #[clap(long, env = "RESTODASH_STORAGE_DIR", default_value = ".restodash")]
    storage_dir: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with e-mail and password
    SignIn { email: String, password: String },
    /// Sign out everywhere
    SignOut,
    /// Show the signed-in user
    Whoami,
    /// List tenants
    Tenants,
    /// List restaurants
    Restaurants {
        #[clap(long)]
        tenant: Option<String>,
    },
    /// List roles
    Roles,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = DashboardConfig::from_env()
        .context("SUPABASE_URL and SUPABASE_ANON_KEY must be set")?
        .with_storage_dir(cli.storage_dir);
    let dashboard = Dashboard::new(config)?;
    let bridge = dashboard.mount_auth_bridge().await;

    match cli.command {
        Command::SignIn { email, password } => {
            let outcome = dashboard.sign_in(&email, &password).await;
            if let Some(error) = outcome.error {
                bail!("sign-in failed: {}", error);
            }
            println!("signed in as {}", email);
        }
        Command::SignOut => {
            dashboard.sign_out().await;
            println!("signed out");
        }
        Command::Whoami => match bridge.access() {
            RouteAccess::Authenticated => {
                if let Some(user) = bridge.user() {
                    println!("{} <{}>", user.id, user.email);
                    if let Some(roles) = user.roles {
                        println!("roles: {}", roles.join(", "));
                    }
                }
            }
            _ => println!("not signed in"),
        },
        Command::Tenants => {
            for tenant in dashboard.tenants().list().await? {
                println!("{}\t{}", tenant.id, tenant.name);
            }
        }
        Command::Restaurants { tenant } => {
            for restaurant in dashboard.restaurants().list(tenant.as_deref()).await? {
                println!("{}\t{}\t{}", restaurant.id, restaurant.name, restaurant.address);
            }
        }
        Command::Roles => {
            for role in dashboard.roles().list().await? {
                println!(
                    "{}\t{}\t{}",
                    role.id,
                    role.name,
                    role.description.unwrap_or_default()
                );
            }
        }
    }

    bridge.unmount();
    Ok(())
}
