//! Monitoring VM and firewall command implementations

use anyhow::{Result, anyhow};

use crate::commands::{Context, banner};
use crate::gcp::{FirewallRule, Instance, InstanceStatus};
use crate::install::runtime;

fn instance(ctx: &Context) -> Instance {
    Instance::from_settings(&ctx.settings.vm, &ctx.settings.gcp.zone)
}

/// Handle vm create command
pub fn create(ctx: &Context) -> Result<()> {
    let gcloud = ctx.gcloud()?;
    let instance = instance(ctx);

    if instance.create(&gcloud)? {
        banner(&format!("VM '{}' created in {}", instance.name, instance.zone));
    }
    if let Some(ip) = instance.external_ip(&gcloud)? {
        println!("{} external IP: {}", instance.name, ip);
    }
    Ok(())
}

/// Handle vm start command
pub fn start(ctx: &Context) -> Result<()> {
    instance(ctx).start(&ctx.gcloud()?)
}

/// Handle vm stop command
pub fn stop(ctx: &Context) -> Result<()> {
    instance(ctx).stop(&ctx.gcloud()?)
}

/// Handle vm status command
pub fn status(ctx: &Context) -> Result<()> {
    let gcloud = ctx.gcloud()?;
    let instance = instance(ctx);

    match instance.status(&gcloud)? {
        None => println!("{}: not found", instance.name),
        Some(status) => {
            let ip = if status == InstanceStatus::Running {
                instance.external_ip(&gcloud)?
            } else {
                None
            };
            match ip {
                Some(ip) => println!("{}: {} ({})", instance.name, status, ip),
                None => println!("{}: {}", instance.name, status),
            }
        }
    }
    Ok(())
}

/// Handle vm delete command
pub fn delete(ctx: &Context) -> Result<()> {
    let gcloud = ctx.gcloud()?;
    let instance = instance(ctx);

    if instance.status(&gcloud)?.is_none() {
        crate::log_warn!("Instance '{}' does not exist", instance.name);
        return Ok(());
    }

    if !crate::utils::confirm(
        &format!("Are you sure you want to delete VM '{}'?", instance.name),
        ctx.assume_yes,
    )? {
        crate::log_info!("Deletion cancelled");
        return Ok(());
    }

    instance.delete(&gcloud)?;
    Ok(())
}

/// Handle vm install-runtime command: Docker over ssh, only when absent
pub fn install_runtime(ctx: &Context) -> Result<()> {
    let gcloud = ctx.gcloud()?;
    let instance = instance(ctx);

    match instance.status(&gcloud)? {
        Some(InstanceStatus::Running) => {}
        Some(status) => {
            return Err(anyhow!(
                "Instance '{}' is {}; start it with: scalelab vm start",
                instance.name,
                status
            ));
        }
        None => {
            return Err(anyhow!(
                "Instance '{}' does not exist; create it with: scalelab vm create",
                instance.name
            ));
        }
    }

    if runtime::ensure_docker(&gcloud, &instance)? {
        banner("Docker installed. Log out and back in on the VM to use it without sudo.");
    }
    Ok(())
}

/// Handle firewall ensure command
pub fn ensure_firewall(ctx: &Context) -> Result<()> {
    let rule = FirewallRule::from_settings(&ctx.settings.vm, ctx.settings.monitoring.prometheus_port);
    rule.ensure(&ctx.gcloud()?)?;
    Ok(())
}
