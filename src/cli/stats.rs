//! Stats command - Show row counts

use clap::Args;

use super::utils::Workspace;

/// Stats command arguments
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute stats command
pub fn execute(args: StatsArgs, ws: &Workspace) -> anyhow::Result<()> {
    let store = ws.open_store()?;
    let stats = store.stats()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Segments:    {}", stats.segments);
        println!("Users:       {}", stats.users);
        println!("Memberships: {}", stats.memberships);
        println!("\nDatabase: {}", ws.db_path.display());
        println!("Delete policy: {}", ws.config.membership.delete_policy);
    }

    Ok(())
}
