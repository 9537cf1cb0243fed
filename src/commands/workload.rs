//! Workload manifest command implementations

use anyhow::Result;
use std::path::PathBuf;

use crate::commands::Context;
use crate::config::experiment::{self, ManifestKind};
use crate::k8s::manifests;
use crate::utils::ScaleLabError;
use crate::utils::dryrun::exec_unless_dry_run;

/// Objects `apply` and `delete` act on, in apply order
fn kinds(with_loadgen: bool) -> Vec<ManifestKind> {
    let mut kinds = vec![
        ManifestKind::Deployment,
        ManifestKind::Service,
        ManifestKind::Hpa,
    ];
    if with_loadgen {
        kinds.push(ManifestKind::LoadGen);
    }
    kinds
}

fn manifests_dir(ctx: &Context) -> PathBuf {
    PathBuf::from(&ctx.settings.experiment.manifests_dir)
}

/// Handle workload render command
pub fn render(ctx: &Context, app: &str, namespace: Option<String>) -> Result<()> {
    let namespace = ctx.namespace(namespace);
    let dir = manifests_dir(ctx);

    exec_unless_dry_run(
        &format!("Render manifests for '{}' into {}", app, dir.display()),
        || {
            for path in manifests::render_to_dir(&dir, app, &namespace, &ctx.settings.workload)? {
                println!("{}", path.display());
            }
            Ok(())
        },
    )
}

/// Handle workload apply command. `inline` renders in memory instead of
/// reading the manifests directory.
pub fn apply(
    ctx: &Context,
    app: &str,
    namespace: Option<String>,
    with_loadgen: bool,
    inline: bool,
) -> Result<()> {
    let namespace = ctx.namespace(namespace);
    let dir = manifests_dir(ctx);
    let kubectl = ctx.kubectl();

    let kinds = kinds(with_loadgen);
    if inline {
        for kind in kinds {
            let yaml = manifests::render(kind, app, &namespace, &ctx.settings.workload)?;
            kubectl.apply_yaml(&yaml, &namespace)?;
        }
        return Ok(());
    }

    for &kind in &kinds {
        let path = experiment::manifest_path(&dir, app, kind);
        if !path.exists() {
            return Err(ScaleLabError::file_not_found(
                &path.display().to_string(),
                &format!("Render it with: scalelab workload render {}", app),
            )
            .into());
        }
    }

    for kind in kinds {
        kubectl.apply_file(&experiment::manifest_path(&dir, app, kind), &namespace)?;
    }
    Ok(())
}

/// Handle workload scale command
pub fn scale(ctx: &Context, app: &str, namespace: Option<String>, replicas: u32) -> Result<()> {
    let namespace = ctx.namespace(namespace);
    let kubectl = ctx.kubectl();
    let deployment = experiment::object_name(app, ManifestKind::Deployment);

    kubectl.scale_deployment(&deployment, &namespace, replicas)?;
    crate::utils::progress::with_spinner_result(
        &format!("Waiting for {} to reach {} replicas", deployment, replicas),
        "Rollout complete",
        || {
            kubectl
                .rollout_status(
                    &deployment,
                    &namespace,
                    &ctx.settings.experiment.rollout_timeout,
                )
                .map_err(|e| e.context(ScaleLabError::deployment_not_ready(&deployment, &namespace)))
        },
    )
}

/// Handle workload delete command. Missing objects are logged, not fatal.
pub fn delete(ctx: &Context, app: &str, namespace: Option<String>, with_loadgen: bool) -> Result<()> {
    let namespace = ctx.namespace(namespace);
    let kubectl = ctx.kubectl();

    for kind in kinds(with_loadgen).into_iter().rev() {
        kubectl.delete_tolerant(
            kind.kubectl_resource(),
            &experiment::object_name(app, kind),
            &namespace,
            kind == ManifestKind::Deployment,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::utils::exec::testing::FakeRunner;

    fn settings_in(dir: &tempfile::TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.experiment.manifests_dir = dir.path().to_string_lossy().into_owned();
        settings
    }

    #[test]
    fn test_apply_requires_rendered_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let ctx = Context::new(settings_in(&dir), &runner);

        let err = apply(&ctx, "web", None, false, false).unwrap_err();
        assert!(err.to_string().contains("web-deployment.yaml"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_render_then_apply() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let ctx = Context::new(settings_in(&dir), &runner);

        render(&ctx, "web", None).unwrap();
        assert!(dir.path().join("web-loadgen.yaml").exists());

        apply(&ctx, "web", Some("lab".to_string()), false, false).unwrap();
        let applies = runner.calls_starting_with("kubectl apply");
        assert_eq!(applies.len(), 3);
        assert!(applies[0].contains("web-deployment.yaml"));
        assert!(applies.iter().all(|c| c.contains("-n lab")));
    }

    #[test]
    fn test_inline_apply_needs_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let ctx = Context::new(settings_in(&dir), &runner);

        apply(&ctx, "web", None, true, true).unwrap();
        assert_eq!(runner.calls_starting_with("kubectl apply").len(), 4);
        assert!(!dir.path().join("web-deployment.yaml").exists());
    }

    #[test]
    fn test_scale_waits_for_rollout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let ctx = Context::new(settings_in(&dir), &runner);

        scale(&ctx, "web", None, 5).unwrap();
        assert_eq!(
            runner.calls_starting_with("kubectl scale"),
            vec!["kubectl scale deployment/web-deployment --replicas=5 -n default"]
        );
        assert_eq!(runner.calls_starting_with("kubectl rollout status").len(), 1);
    }

    #[test]
    fn test_delete_reverses_apply_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner.respond("kubectl delete", false, "");
        let ctx = Context::new(settings_in(&dir), &runner);

        delete(&ctx, "web", None, true).unwrap();
        assert_eq!(
            runner.calls_starting_with("kubectl delete"),
            vec![
                "kubectl delete deployment web-loadgen -n default --wait=false",
                "kubectl delete hpa web-hpa -n default --wait=false",
                "kubectl delete service web-service -n default --wait=false",
                "kubectl delete deployment web-deployment -n default --wait=true",
            ]
        );
    }
}
