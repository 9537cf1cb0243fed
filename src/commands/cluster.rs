//! Cluster command implementations

use anyhow::Result;

use crate::commands::{Context, banner};
use crate::gcp::AutopilotCluster;
use crate::gcp::cluster::CreateOutcome;

fn cluster(ctx: &Context) -> AutopilotCluster {
    AutopilotCluster::new(&ctx.settings.cluster.name, &ctx.settings.gcp.region)
}

/// Handle cluster create command: create if absent, then fetch credentials
pub fn create(ctx: &Context) -> Result<()> {
    let gcloud = ctx.gcloud()?;
    let cluster = cluster(ctx);

    let outcome = crate::utils::progress::with_spinner_result(
        &format!("Ensuring cluster {}", cluster.name),
        "Cluster ready",
        || cluster.create(&gcloud),
    )?;
    cluster.get_credentials(&gcloud)?;

    if outcome == CreateOutcome::Created {
        banner("Cluster created successfully!");
    }
    println!(
        "Cluster '{}' in {} ({:?}); kubectl context: {}",
        cluster.name,
        cluster.region,
        outcome,
        ctx.kubectl()
            .current_context()
            .unwrap_or_else(|_| "unknown".to_string())
    );
    Ok(())
}

/// Handle cluster credentials command
pub fn credentials(ctx: &Context) -> Result<()> {
    cluster(ctx).get_credentials(&ctx.gcloud()?)
}

/// Handle cluster status command
pub fn status(ctx: &Context) -> Result<()> {
    let cluster = cluster(ctx);
    match cluster.status(&ctx.gcloud()?)? {
        Some(status) => println!("{}: {}", cluster.name, status),
        None => println!("{}: not found", cluster.name),
    }
    Ok(())
}

/// Handle cluster delete command
pub fn delete(ctx: &Context) -> Result<()> {
    let gcloud = ctx.gcloud()?;
    let cluster = cluster(ctx);

    if !cluster.exists(&gcloud)? {
        crate::log_warn!("Cluster '{}' does not exist", cluster.name);
        return Ok(());
    }

    if !crate::utils::confirm(
        &format!("Are you sure you want to delete cluster '{}'?", cluster.name),
        ctx.assume_yes,
    )? {
        crate::log_info!("Deletion cancelled");
        return Ok(());
    }

    cluster.delete(&gcloud)?;
    Ok(())
}
