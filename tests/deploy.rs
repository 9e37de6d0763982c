// ABOUTME: Integration tests for the deploy state machine against a recording fake runner.
// ABOUTME: Covers promotion, failed checks, first deploys, the signal window, and the deploy lock.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dokku::deploy::{Cancellation, CancellationGuard, DeployError, Deployer, LOCK_FILENAME, LockInfo};
use dokku::diagnostics::{Diagnostics, WarningKind};
use dokku::output::{Output, OutputMode};
use dokku::registry::AppRegistry;
use dokku::runtime::DockerCli;
use dokku::types::{AppName, ContainerId};
use support::{FakeRunner, TestHost};

const RUN_CANDIDATE: &str = "docker run -d -p 5000 -e PORT=5000";

/// Candidate `B` published on 49170.
fn candidate_b(fake: &FakeRunner) {
    fake.respond(RUN_CANDIDATE, 0, "B\n")
        .respond("docker port B 5000", 0, "0.0.0.0:49170\n");
}

fn quiet() -> Output {
    Output::new(OutputMode::Quiet)
}

/// Cancellation whose trigger never fires.
fn never() -> Cancellation {
    Cancellation::manual(std::future::pending(), || {})
}

async fn deploy(
    host: &TestHost,
    fake: &Arc<FakeRunner>,
    app: &AppName,
    cancellation: Cancellation,
    diag: &mut Diagnostics,
) -> Result<dokku::registry::RoutingState, DeployError> {
    support::init_tracing();
    Deployer::new(&host.settings, support::runner(fake))
        .deploy(app, cancellation, &quiet(), diag)
        .await
}

mod promotion {
    use super::*;

    #[tokio::test]
    async fn healthy_candidate_replaces_incumbent() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);

        let mut diag = Diagnostics::default();
        let routing = deploy(&host, &fake, &app, never(), &mut diag)
            .await
            .expect("deploy should succeed");

        assert_eq!(routing.container.as_str(), "B");
        assert_eq!(routing.port, 49170);
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("B"));
        assert_eq!(host.read(&app, "PORT").as_deref(), Some("49170"));
        assert_eq!(
            host.read(&app, "URL").as_deref(),
            Some("http://apps.test:49170")
        );

        assert!(fake.ran("docker kill A"));
        assert!(!fake.ran("docker kill B"));
        assert!(!diag.has_warnings());
    }

    #[tokio::test]
    async fn hooks_and_runtime_calls_run_in_order() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);

        deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap();

        let order = [
            "pluginhook pre-deploy foo",
            "pluginhook docker-args foo",
            RUN_CANDIDATE,
            "docker port B 5000",
            "pluginhook check-deploy B foo 49170",
            "pluginhook post-deploy foo 49170",
            "docker inspect A",
            "docker kill A",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|prefix| fake.position(prefix).unwrap_or_else(|| panic!("{prefix} not run")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", fake.calls());
    }

    #[tokio::test]
    async fn docker_args_are_spliced_before_the_image() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        candidate_b(&fake);
        fake.respond("pluginhook docker-args", 0, "-v /data:/data\n--memory 512m\n");

        deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap();

        assert!(fake.ran(
            "docker run -d -p 5000 -e PORT=5000 -v /data:/data --memory 512m dokku/foo /bin/bash -c /start web"
        ));
        assert!(matches!(
            fake.stdin_of("pluginhook docker-args"),
            Some(dokku::process::StdinSource::Null)
        ));
    }

    #[tokio::test]
    async fn first_deploy_skips_retirement() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        candidate_b(&fake);

        let routing = deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .expect("first deploy should succeed");

        assert_eq!(routing.container.as_str(), "B");
        assert!(!fake.ran("docker inspect"));
        assert!(!fake.ran("docker kill"));
    }

    #[tokio::test]
    async fn incumbent_already_gone_is_tolerated() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);
        fake.fail("docker inspect A", 1);

        let mut diag = Diagnostics::default();
        deploy(&host, &fake, &app, never(), &mut diag)
            .await
            .expect("deploy should succeed");

        assert!(!fake.ran("docker kill A"));
        assert!(!diag.has_warnings());
    }

    #[tokio::test]
    async fn failing_post_deploy_is_only_a_warning() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);
        fake.fail("pluginhook post-deploy", 1);

        let mut diag = Diagnostics::default();
        deploy(&host, &fake, &app, never(), &mut diag)
            .await
            .expect("post-deploy failure must not fail the deploy");

        assert!(diag.has_kind(WarningKind::PostDeployHook));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("B"));
        assert!(fake.ran("docker kill A"));
    }

    #[tokio::test]
    async fn corrupt_port_record_does_not_block_deploys() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        host.write(&app, "PORT", "not-a-port");
        let fake = FakeRunner::new();
        candidate_b(&fake);

        let mut diag = Diagnostics::default();
        deploy(&host, &fake, &app, never(), &mut diag)
            .await
            .expect("deploy should succeed");

        assert!(diag.has_kind(WarningKind::RoutingSnapshot));
        assert!(fake.ran("docker kill A"));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("B"));
        assert_eq!(host.read(&app, "PORT").as_deref(), Some("49170"));
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn failed_check_leaves_incumbent_serving() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);
        fake.fail("pluginhook check-deploy", 1);

        let err = deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::CheckFailed { .. }), "{err}");
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("A"));
        assert_eq!(host.read(&app, "PORT").as_deref(), Some("49153"));
        assert!(fake.ran("docker kill B"));
        assert!(!fake.ran("docker kill A"));
        assert!(!fake.ran("pluginhook post-deploy"));
    }

    #[tokio::test]
    async fn failed_check_on_first_deploy_writes_nothing() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        candidate_b(&fake);
        fake.fail("pluginhook check-deploy", 1);

        deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert_eq!(host.read(&app, "CONTAINER"), None);
        assert_eq!(host.read(&app, "PORT"), None);
        assert_eq!(host.read(&app, "URL"), None);
    }

    #[tokio::test]
    async fn check_timeout_fails_the_verdict() {
        let mut host = TestHost::new();
        host.settings.check_timeout = Some(Duration::from_millis(50));
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);
        let _never_released = fake.hold("pluginhook check-deploy");

        let err = deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::CheckTimeout { .. }), "{err}");
        assert!(fake.ran("docker kill B"));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn failing_pre_deploy_starts_nothing() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        fake.fail("pluginhook pre-deploy", 2);

        let err = deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Hook(_)), "{err}");
        assert!(!fake.ran("docker"));
    }

    #[tokio::test]
    async fn unresolvable_port_discards_candidate() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        fake.respond(RUN_CANDIDATE, 0, "B\n");
        fake.fail("docker port B", 1);

        deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(fake.ran("docker kill B"));
        assert!(!fake.ran("pluginhook check-deploy"));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn missing_docker_is_reported_as_unavailable() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        fake.missing("docker");

        let err = deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert_eq!(err.unavailable_program(), Some("docker"));
    }

    #[tokio::test]
    async fn unknown_app_is_rejected() {
        let host = TestHost::new();
        let app = AppName::new("ghost").unwrap();
        let fake = FakeRunner::new();

        let err = deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Registry(_)), "{err}");
        assert!(fake.calls().is_empty());
    }
}

mod signal_window {
    use super::*;

    /// Cancellation that fires once `prefix` has started and reports the terminator call.
    fn fire_on(
        fake: &Arc<FakeRunner>,
        prefix: &str,
        release: Arc<tokio::sync::Notify>,
    ) -> (Cancellation, tokio::sync::oneshot::Receiver<()>) {
        let (terminated_tx, terminated_rx) = tokio::sync::oneshot::channel();
        let cancellation = Cancellation::manual(fake.clone().wait_for(prefix.to_string()), move || {
            release.notify_one();
            let _ = terminated_tx.send(());
        });
        (cancellation, terminated_rx)
    }

    #[tokio::test]
    async fn trigger_during_check_kills_candidate_only() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);
        let release = fake.hold("pluginhook check-deploy");
        let (cancellation, terminated) = fire_on(&fake, "pluginhook check-deploy", release);

        let err = deploy(&host, &fake, &app, cancellation, &mut Diagnostics::default())
            .await
            .unwrap_err();
        terminated.await.expect("terminator should run");

        assert!(matches!(err, DeployError::Interrupted(_)), "{err}");
        assert!(fake.ran("docker kill B"));
        assert!(!fake.ran("docker kill A"));
        assert!(!fake.ran("pluginhook post-deploy"));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("A"));
        assert_eq!(host.read(&app, "PORT").as_deref(), Some("49153"));
    }

    #[tokio::test]
    async fn trigger_after_promotion_restores_previous_routing() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);
        let release = fake.hold("pluginhook post-deploy");
        let (cancellation, terminated) = fire_on(&fake, "pluginhook post-deploy", release);

        let err = deploy(&host, &fake, &app, cancellation, &mut Diagnostics::default())
            .await
            .unwrap_err();
        terminated.await.expect("terminator should run");

        assert!(matches!(err, DeployError::Interrupted(_)), "{err}");
        assert!(fake.ran("docker kill B"));
        assert!(!fake.ran("docker kill A"));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("A"));
        assert_eq!(host.read(&app, "PORT").as_deref(), Some("49153"));
        assert_eq!(
            host.read(&app, "URL").as_deref(),
            Some("http://apps.test:49153")
        );
    }

    #[tokio::test]
    async fn deploy_returns_only_after_rollback_finished() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);
        // The hook dies with the signal instead of waiting for the terminator.
        let post_deploy = fake.hold("pluginhook post-deploy");
        let inspect = fake.hold("docker inspect B");

        let terminated = Arc::new(AtomicBool::new(false));
        let flag = terminated.clone();
        let trigger = {
            let fake = fake.clone();
            async move {
                fake.wait_for("pluginhook post-deploy".to_string()).await;
                post_deploy.notify_one();
            }
        };
        let cancellation =
            Cancellation::manual(trigger, move || flag.store(true, Ordering::SeqCst));

        let slow_runtime = {
            let fake = fake.clone();
            tokio::spawn(async move {
                fake.wait_for("docker inspect B".to_string()).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                inspect.notify_one();
            })
        };

        let err = deploy(&host, &fake, &app, cancellation, &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Interrupted(_)), "{err}");
        assert!(fake.ran("docker kill B"));
        assert!(!fake.ran("docker kill A"));
        assert!(terminated.load(Ordering::SeqCst));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("A"));
        assert_eq!(host.read(&app, "PORT").as_deref(), Some("49153"));
        slow_runtime.await.unwrap();
    }

    #[tokio::test]
    async fn signal_during_candidate_start_is_not_lost() {
        use nix::sys::signal::{Signal, raise};

        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        fake.respond("docker port B 5000", 0, "0.0.0.0:49170\n");
        let started = fake.hold_with(RUN_CANDIDATE, "B\n");
        let check = fake.hold("pluginhook check-deploy");

        let (terminated_tx, terminated_rx) = tokio::sync::oneshot::channel();
        let cancellation = Cancellation::signals_then(move || {
            check.notify_one();
            let _ = terminated_tx.send(());
        });

        let interrupter = {
            let fake = fake.clone();
            tokio::spawn(async move {
                fake.wait_for(RUN_CANDIDATE.to_string()).await;
                raise(Signal::SIGINT).unwrap();
                started.notify_one();
            })
        };

        let err = deploy(&host, &fake, &app, cancellation, &mut Diagnostics::default())
            .await
            .unwrap_err();
        interrupter.await.unwrap();
        terminated_rx.await.expect("terminator should run");

        assert!(matches!(err, DeployError::Interrupted(_)), "{err}");
        assert!(fake.ran("docker kill B"));
        assert!(!fake.ran("pluginhook post-deploy"));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn trigger_after_disarm_kills_nothing() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        host.set_incumbent(&app, "A", 49153);
        let fake = FakeRunner::new();
        candidate_b(&fake);

        let (trigger_tx, trigger_rx) = tokio::sync::oneshot::channel::<()>();
        let terminated = Arc::new(AtomicBool::new(false));
        let flag = terminated.clone();
        let cancellation = Cancellation::manual(
            async move {
                let _ = trigger_rx.await;
            },
            move || flag.store(true, Ordering::SeqCst),
        );

        deploy(&host, &fake, &app, cancellation, &mut Diagnostics::default())
            .await
            .expect("deploy should succeed");

        let _ = trigger_tx.send(());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(!fake.ran("docker kill B"));
        assert!(!terminated.load(Ordering::SeqCst));
        assert_eq!(host.read(&app, "CONTAINER").as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn dropping_an_armed_guard_kills_candidate() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        let docker = DockerCli::new("docker", support::runner(&fake));

        let guard = CancellationGuard::arm(
            never().install().unwrap(),
            docker,
            AppRegistry::new(&host.settings),
            app,
            ContainerId::new("B"),
        );
        drop(guard);

        assert_eq!(fake.detached(), vec!["docker kill B".to_string()]);
    }

    #[tokio::test]
    async fn disarmed_guard_drops_quietly() {
        let host = TestHost::new();
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        let docker = DockerCli::new("docker", support::runner(&fake));

        let guard = CancellationGuard::arm(
            never().install().unwrap(),
            docker,
            AppRegistry::new(&host.settings),
            app,
            ContainerId::new("B"),
        );
        guard.disarm().await.expect("disarm should succeed");

        assert!(fake.detached().is_empty());
        assert!(fake.calls().is_empty());
    }
}

mod locking {
    use super::*;

    #[tokio::test]
    async fn held_lock_blocks_deploy() {
        let mut host = TestHost::new();
        host.settings.deploy_lock = true;
        let app = host.add_app("foo");
        let info = serde_json::to_string(&LockInfo::new(&app)).unwrap();
        host.write(&app, LOCK_FILENAME, &info);
        let fake = FakeRunner::new();

        let err = deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::LockHeld { .. }), "{err}");
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn lock_is_released_after_deploy() {
        let mut host = TestHost::new();
        host.settings.deploy_lock = true;
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        candidate_b(&fake);

        deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap();

        assert!(!host.app_dir(&app).join(LOCK_FILENAME).exists());
    }

    #[tokio::test]
    async fn lock_is_released_after_failed_deploy() {
        let mut host = TestHost::new();
        host.settings.deploy_lock = true;
        let app = host.add_app("foo");
        let fake = FakeRunner::new();
        candidate_b(&fake);
        fake.fail("pluginhook check-deploy", 1);

        deploy(&host, &fake, &app, never(), &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(!host.app_dir(&app).join(LOCK_FILENAME).exists());
    }
}
